#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("viewer is blocked by actor {actor}")]
    BlockedByActor { actor: String },
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },
    #[error("xrpc error {status}: {error}: {message}")]
    Xrpc {
        status: u16,
        error: String,
        message: String,
    },
    #[error("access token not configured")]
    MissingCredentials,
}

pub fn is_blocked_by_actor(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<FeedError>(),
            Some(FeedError::BlockedByActor { .. })
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn detects_soft_block_through_context() {
        let err = Err::<(), _>(FeedError::BlockedByActor {
            actor: "did:plc:blocker".into(),
        })
        .context("fetch author feed")
        .unwrap_err();
        assert!(is_blocked_by_actor(&err));
    }

    #[test]
    fn other_errors_are_not_soft_blocks() {
        let err = anyhow::Error::new(FeedError::Xrpc {
            status: 500,
            error: "InternalServerError".into(),
            message: "boom".into(),
        });
        assert!(!is_blocked_by_actor(&err));
        assert!(!is_blocked_by_actor(&anyhow::anyhow!("transport closed")));
    }
}
