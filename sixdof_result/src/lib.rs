use std::{
    collections::HashMap,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use ambassador::delegatable_trait;
use csv::Writer;
use thiserror::Error;

pub type ResultWriter = Writer<BufWriter<File>>;

#[derive(Debug, Error)]
pub enum ResultErrors {
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("no result writer with id {0}")]
    WriterNotFound(u32),
}

/// Owns one csv writer per recorded quantity, all under `result_path`.
#[derive(Debug)]
pub struct ResultManager {
    writers: HashMap<u32, ResultWriter>,
    pub result_path: PathBuf,
    next_id: u32,
}

impl ResultManager {
    pub fn new(result_path: PathBuf) -> Self {
        Self {
            writers: HashMap::new(),
            result_path,
            next_id: 0,
        }
    }

    /// Creates `<path>/<name>.csv` with a header row and returns its writer id.
    pub fn new_writer(
        &mut self,
        name: &str,
        path: &Path,
        headers: &[&str],
    ) -> Result<u32, ResultErrors> {
        std::fs::create_dir_all(path)?;

        let filename = name.to_string() + ".csv";
        let file = File::create(path.join(filename))?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        writer.write_record(headers)?;
        let id = self.next_id;
        self.writers.insert(id, writer);
        self.next_id += 1;
        Ok(id)
    }

    pub fn write_record(&mut self, id: u32, content: &[String]) -> Result<(), ResultErrors> {
        let writer = self
            .writers
            .get_mut(&id)
            .ok_or(ResultErrors::WriterNotFound(id))?;
        writer.write_record(content)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ResultErrors> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[delegatable_trait]
pub trait SixDofResult {
    /// Creates the writer that records this component
    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), ResultErrors>;
    /// Writes the next row at sim time `t`
    fn write_result(&self, t: f64, results: &mut ResultManager) -> Result<(), ResultErrors>;
}
