//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_approval_request_repository;
mod in_memory_audit_log_repository;
mod in_memory_grant_store;
mod in_memory_session_repository;
mod postgres_approval_request_repository;
mod postgres_audit_log_repository;
mod postgres_session_repository;
mod redis_grant_store;
mod redis_session_repository;
mod store_errors;

pub use in_memory_approval_request_repository::InMemoryApprovalRequestRepository;
pub use in_memory_audit_log_repository::InMemoryAuditLogRepository;
pub use in_memory_grant_store::InMemoryGrantStore;
pub use in_memory_session_repository::InMemorySessionRepository;
pub use postgres_approval_request_repository::PostgresApprovalRequestRepository;
pub use postgres_audit_log_repository::PostgresAuditLogRepository;
pub use postgres_session_repository::PostgresSessionRepository;
pub use redis_grant_store::RedisGrantStore;
pub use redis_session_repository::RedisSessionRepository;
