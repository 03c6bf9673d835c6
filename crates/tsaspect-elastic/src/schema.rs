//! Time-series index settings and mapping.

/// Body of the create-index request for every time-series aspect index.
///
/// `urn` is a keyword so entity matches are exact. `event` and
/// `systemMetadata` are kept in `_source` but not indexed, since their
/// shape varies per aspect. Projected fields fall under dynamic mapping.
pub const TIMESERIES_INDEX_MAPPING: &str = r#"{
  "settings": {
    "index": {
      "number_of_shards": 1,
      "number_of_replicas": 1,
      "refresh_interval": "1s"
    }
  },
  "mappings": {
    "dynamic": true,
    "properties": {
      "urn": { "type": "keyword" },
      "timestampMillis": { "type": "date", "format": "epoch_millis" },
      "event": { "type": "object", "enabled": false },
      "systemMetadata": { "type": "object", "enabled": false }
    }
  }
}"#;
