use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Label(#[from] gptlabel::Error),
    #[error("{0}")]
    Message(String),
    #[error("{0} critical fault(s) found")]
    Faults(usize),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Label(err) => err.exit_code(),
            Error::Message(_) | Error::Faults(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
