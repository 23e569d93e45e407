use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the archive")]
    Storage,
    #[display("could not open the ledger")]
    Ledger,
    #[display("run failed")]
    Run,
    #[display("interrupted")]
    Interrupted,
}
