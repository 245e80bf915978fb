use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("Document not found")]
    NotFound,
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

pub type DaoResult<T> = Result<T, DaoError>;
