use thiserror::Error;

pub type ParcryptResult<T> = Result<T, ParcryptError>;

#[derive(Debug, Error)]
pub enum ParcryptError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
