pub mod departments_db_operations;
pub mod documents_db_operations;
pub mod news_db_operations;
pub mod stats_db_operations;
pub mod users_db_operations;
