//! # Error Redaction Across Node Boundaries
//!
//! A bridge serving remote peers redacts private error messages while the
//! code, origin and visibility survive. Local callers and public errors are
//! unaffected.

#[cfg(test)]
mod tests {
    use crate::fixtures::{registry_client, request_with, EchoAction};
    use cm_03_capability_registry::CapabilityRegistryApi;
    use node_runtime::{NodeConfig, NodeRuntime};
    use serde_json::json;
    use shared_types::{
        Capability, ErrorCode, Origin, Visibility, REDACTED_ERROR_MESSAGE,
    };

    async fn node(redact: bool) -> NodeRuntime {
        let mut config = NodeConfig::default();
        config.registry.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.registry.redact_private_errors = redact;
        config.heartbeat.enabled = false;
        let runtime = NodeRuntime::new(config).unwrap();
        runtime
            .registry()
            .add(Capability::executable(EchoAction::new("db-action@1.0.0")))
            .await
            .unwrap();
        runtime
    }

    #[tokio::test]
    async fn test_private_error_redacted_for_remote_peer() {
        let runtime = node(true).await;
        let addr = runtime.start().await.unwrap();

        let client = registry_client(addr).await;
        let action = client.get_executable("db-action@1.0.0").await.unwrap();
        let err = action
            .execute(request_with("fail", json!("private")))
            .await
            .unwrap_err();

        assert_eq!(err.message(), REDACTED_ERROR_MESSAGE);
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.origin(), Origin::System);
        assert_eq!(err.visibility(), Visibility::Private);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_public_error_passes_through_redacting_bridge() {
        let runtime = node(true).await;
        let addr = runtime.start().await.unwrap();

        let client = registry_client(addr).await;
        let action = client.get_executable("db-action@1.0.0").await.unwrap();
        let err = action
            .execute(request_with("fail", json!("negative amount")))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "rejected input: negative amount");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(err.origin(), Origin::User);
        assert!(err.is_public());

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_local_bridge_keeps_private_message() {
        let runtime = node(false).await;
        runtime.start().await.unwrap();

        let action = runtime.registry().get_executable("db-action@1.0.0").await.unwrap();
        let err = action
            .execute(request_with("fail", json!("private")))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "connection to 10.0.0.7:5432 refused");
        assert_eq!(err.visibility(), Visibility::Private);

        runtime.shutdown().await;
    }
}
