use std::path::PathBuf;

/// One local file waiting to be (or already) uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub path: PathBuf,
    pub uploaded: bool,
}

impl Job {
    pub fn new(id: i64, path: impl Into<PathBuf>) -> Self {
        Self { id, path: path.into(), uploaded: false }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct JobRow {
    id: i64,
    path: String,
    uploaded: bool,
}
impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self { id: row.id, path: PathBuf::from(row.path), uploaded: row.uploaded }
    }
}
