//! Loading and saving the persisted [`ConnectionIntent`]
//!
//! The intent is stored as one camelCase JSON object under
//! [`INTENT_KEY`]. Older installs kept only the address under
//! [`LEGACY_ADDRESS_KEY`]; it is read as a fallback and never written.

use blinds_core::prelude::*;
use blinds_core::ConnectionIntent;

use crate::store::KeyValueStore;

/// Store key of the intent record
pub const INTENT_KEY: &str = "connection_intent";

/// Store key that held the bare address before the intent record existed
pub const LEGACY_ADDRESS_KEY: &str = "address";

/// Load the intent, falling back to defaults on any problem.
///
/// Missing, unreadable and malformed records are logged and replaced by
/// `ConnectionIntent::new(default_address)`; nothing here reaches the user.
pub async fn load_intent<S: KeyValueStore>(store: &S, default_address: &str) -> ConnectionIntent {
    match try_load_intent(store).await {
        Ok(Some(intent)) => intent,
        Ok(None) => {
            debug!("No stored connection intent, using defaults");
            ConnectionIntent::new(default_address)
        }
        Err(e) => {
            warn!("Ignoring stored connection intent: {}", e);
            ConnectionIntent::new(default_address)
        }
    }
}

/// Load the intent, reporting store and decode failures
pub async fn try_load_intent<S: KeyValueStore>(store: &S) -> Result<Option<ConnectionIntent>> {
    if let Some(raw) = store.get(INTENT_KEY).await? {
        let intent = serde_json::from_str::<ConnectionIntent>(&raw)
            .map_err(|e| Error::persistence(format!("Malformed connection intent: {}", e)))?;
        return Ok(Some(intent));
    }

    match store.get(LEGACY_ADDRESS_KEY).await? {
        Some(address) if !address.trim().is_empty() => {
            info!("Migrating legacy stored address {:?}", address);
            Ok(Some(ConnectionIntent::new(address.trim())))
        }
        _ => Ok(None),
    }
}

/// Persist the full intent snapshot
pub async fn save_intent<S: KeyValueStore>(store: &S, intent: &ConnectionIntent) -> Result<()> {
    let raw = serde_json::to_string(intent)?;
    store.set(INTENT_KEY, &raw).await?;
    trace!("Saved connection intent: {}", raw);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let store = MemoryStore::new();
        let intent = ConnectionIntent {
            desired_address: "192.168.1.20".to_string(),
            should_stay_connected: true,
            selected_controller_index: 3,
        };

        save_intent(&store, &intent).await.unwrap();

        assert_eq!(load_intent(&store, "10.0.2.2").await, intent);
    }

    #[tokio::test]
    async fn test_record_uses_camel_case_keys() {
        let store = MemoryStore::new();
        save_intent(&store, &ConnectionIntent::new("10.0.0.1"))
            .await
            .unwrap();

        let raw = store.get(INTENT_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"desiredAddress\":\"10.0.0.1\""));
        assert!(raw.contains("\"shouldStayConnected\":false"));
        assert!(raw.contains("\"selectedControllerIndex\":0"));
    }

    #[tokio::test]
    async fn test_missing_record_uses_default_address() {
        let store = MemoryStore::new();

        let intent = load_intent(&store, "10.0.2.2").await;

        assert_eq!(intent, ConnectionIntent::new("10.0.2.2"));
        assert!(!intent.should_stay_connected);
    }

    #[tokio::test]
    async fn test_malformed_record_falls_back_to_defaults() {
        let store = MemoryStore::with_entries([(INTENT_KEY, "{not json")]);

        assert!(matches!(
            try_load_intent(&store).await,
            Err(Error::Persistence { .. })
        ));
        assert_eq!(
            load_intent(&store, "10.0.2.2").await,
            ConnectionIntent::new("10.0.2.2")
        );
    }

    #[tokio::test]
    async fn test_legacy_address_is_migrated() {
        let store = MemoryStore::with_entries([(LEGACY_ADDRESS_KEY, "192.168.0.50")]);

        let intent = load_intent(&store, "10.0.2.2").await;

        assert_eq!(intent.desired_address, "192.168.0.50");
        assert!(!intent.should_stay_connected);
        assert_eq!(intent.selected_controller_index, 0);
    }

    #[tokio::test]
    async fn test_record_wins_over_legacy_address() {
        let store = MemoryStore::with_entries([
            (LEGACY_ADDRESS_KEY, "192.168.0.50"),
            (
                INTENT_KEY,
                r#"{"desiredAddress":"10.1.1.1","shouldStayConnected":true}"#,
            ),
        ]);

        let intent = load_intent(&store, "10.0.2.2").await;

        assert_eq!(intent.desired_address, "10.1.1.1");
        assert!(intent.should_stay_connected);
        assert_eq!(intent.selected_controller_index, 0);
    }

    #[tokio::test]
    async fn test_blank_legacy_address_is_ignored() {
        let store = MemoryStore::with_entries([(LEGACY_ADDRESS_KEY, "   ")]);
        assert_eq!(try_load_intent(&store).await.unwrap(), None);
    }
}
