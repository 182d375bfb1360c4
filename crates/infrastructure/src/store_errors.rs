use bastion_core::AppError;

/// Maps a sqlx failure, treating connectivity problems as retryable.
pub(crate) fn sqlx_error(context: &str, error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            AppError::Unavailable(format!("failed to {context}: {error}"))
        }
        _ => AppError::Internal(format!("failed to {context}: {error}")),
    }
}

/// Maps a redis failure, treating connectivity problems as retryable.
pub(crate) fn redis_error(context: &str, error: redis::RedisError) -> AppError {
    if error.is_io_error()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
        || error.is_timeout()
    {
        return AppError::Unavailable(format!("failed to {context}: {error}"));
    }

    AppError::Internal(format!("failed to {context}: {error}"))
}
