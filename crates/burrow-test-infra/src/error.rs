use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("{service} did not accept connections on {addr} after {attempts} attempts")]
    NotReady {
        service: &'static str,
        addr: String,
        attempts: u32,
    },
}

pub type Result<T> = std::result::Result<T, TestInfraError>;
