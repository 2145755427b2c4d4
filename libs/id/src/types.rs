//! Identifier types used across the bus.

use crate::typed_id;

typed_id!(
    /// Identifies a single event. Child events reference their cause by this id.
    EventId,
    "evt"
);

typed_id!(
    /// Identifies a job submitted to a durable queue backend.
    JobId,
    "job"
);

typed_id!(
    /// Identifies a worker process attached to a durable queue backend.
    WorkerId,
    "wrk"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdError;
    use proptest::prelude::*;

    #[test]
    fn test_event_id_roundtrip() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("evt_"));
    }

    #[test]
    fn test_invalid_prefix() {
        let job = JobId::new().to_string();
        let err = EventId::parse(&job).unwrap_err();
        assert!(err.is_prefix_error());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(WorkerId::parse(""), Err(IdError::Empty));
        assert_eq!(
            WorkerId::parse("wrk01HV4Z2WQXKJNM8GPQY6VBKC3D"),
            Err(IdError::MissingSeparator)
        );
        assert!(matches!(
            WorkerId::parse("wrk_not-a-ulid"),
            Err(IdError::InvalidUlid(_))
        ));
    }

    #[test]
    fn test_json_is_plain_string() {
        let id = JobId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| EventId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_prefixes_distinct() {
        let prefixes = [EventId::PREFIX, JobId::PREFIX, WorkerId::PREFIX];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(unique.len(), prefixes.len());
    }

    proptest! {
        #[test]
        fn test_from_ulid_display_parses_back(raw in any::<u128>()) {
            let id = EventId::from_ulid(crate::Ulid::from(raw));
            prop_assert_eq!(EventId::parse(&id.to_string()).unwrap(), id);
        }
    }
}
