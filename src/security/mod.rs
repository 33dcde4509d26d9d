//! セキュリティ監視
pub mod ids;
