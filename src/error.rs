use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Network(reqwest::Error),
    Io(std::io::Error),
    Download { url: String, status: u16 },
    Store(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Network(e) => write!(f, "Network error: {}", e),
            CacheError::Io(e) => write!(f, "IO error: {}", e),
            CacheError::Download { url, status } => {
                write!(f, "Download failed with status {} for {}", status, url)
            }
            CacheError::Store(e) => write!(f, "Cache store error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}
