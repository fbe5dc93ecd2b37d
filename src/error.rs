use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Why the command could not run. Printed with the full error tree before
/// exiting non-zero.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("cannot load configuration")]
    Config,
    #[display("cannot set up logging")]
    Logging,
    #[display("cannot connect to the object store")]
    Storage,
    #[display("cannot open the job database")]
    Database,
    #[display("invalid job table name")]
    Table,
    #[display("prepare failed")]
    Prepare,
    #[display("upload failed")]
    Upload,
    #[display("cannot read job table status")]
    Status,
    #[display("no such job table: {_0}")]
    UnknownTable(#[error(not(source))] String),
}
