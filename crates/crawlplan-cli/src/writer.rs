use std::io;
use std::path::Path;

use anyhow::{bail, Context};
use crawlplan::QueueEntry;
use fs_err::File;
use serde::Serialize;

/// Column layout shared by every queue file read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCsvFormat {
    pub delimiter: u8,
}

impl Default for QueueCsvFormat {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl TryFrom<char> for QueueCsvFormat {
    type Error = anyhow::Error;

    fn try_from(delimiter: char) -> Result<Self, Self::Error> {
        if !delimiter.is_ascii() || delimiter == '"' {
            bail!("Unsupported CSV delimiter {delimiter:?}");
        }
        Ok(Self {
            delimiter: delimiter as u8,
        })
    }
}

impl From<&QueueCsvFormat> for csv::WriterBuilder {
    fn from(format: &QueueCsvFormat) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(format.delimiter);
        builder
    }
}

impl From<&QueueCsvFormat> for csv::ReaderBuilder {
    fn from(format: &QueueCsvFormat) -> Self {
        let mut builder = csv::ReaderBuilder::new();
        builder.delimiter(format.delimiter);
        builder
    }
}

impl QueueCsvFormat {
    pub fn read(&self, path: &Path) -> anyhow::Result<Vec<QueueEntry>> {
        let file = File::open(path)?;
        csv::ReaderBuilder::from(self)
            .from_reader(file)
            .deserialize()
            .collect::<Result<Vec<QueueEntry>, _>>()
            .with_context(|| format!("Couldn't parse queue {}", path.display()))
    }
}

/// CSV output going to a file, or to stdout when no path is given.
pub struct QueueWriter {
    wtr: csv::Writer<Box<dyn io::Write>>,
}

impl QueueWriter {
    pub fn create(path: Option<&Path>, format: &QueueCsvFormat) -> anyhow::Result<Self> {
        let out: Box<dyn io::Write> = match path {
            Some(path) => Box::new(File::create(path)?),
            None => Box::new(io::stdout()),
        };
        Ok(Self {
            wtr: csv::WriterBuilder::from(format).from_writer(out),
        })
    }

    pub fn write_plan_header(&mut self) -> csv::Result<()> {
        self.wtr
            .write_record(["page_uid", "profile", "url", "proc_instructions", "scheduled", "run"])
    }

    /// One planned row, `run` being the 1-based run the entry belongs to.
    pub fn write_planned(&mut self, entry: &QueueEntry, run: usize) -> csv::Result<()> {
        self.wtr.write_record([
            entry.page_uid.to_string(),
            entry.profile.clone(),
            entry.url.to_string(),
            entry.proc_instructions.join(","),
            entry.scheduled.to_rfc3339(),
            run.to_string(),
        ])
    }

    pub fn serialize<S: Serialize>(&mut self, record: S) -> csv::Result<()> {
        self.wtr.serialize(record)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.wtr.flush()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn entry() -> QueueEntry {
        QueueEntry {
            page_uid: 10,
            profile: "default".into(),
            url: "/index.php?id=10&L=0".into(),
            proc_instructions: vec!["tx_indexedsearch_reindex".into(), "tx_news_reindex".into()],
            scheduled: Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap(),
            exec_time: None,
        }
    }

    #[test]
    fn planned_rows_use_the_format_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.csv");
        let format = QueueCsvFormat::try_from(';').unwrap();

        let mut wtr = QueueWriter::create(Some(&path), &format).unwrap();
        wtr.write_plan_header().unwrap();
        wtr.write_planned(&entry(), 2).unwrap();
        wtr.flush().unwrap();
        drop(wtr);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            "page_uid;profile;url;proc_instructions;scheduled;run\n\
             10;default;/index.php?id=10&L=0;tx_indexedsearch_reindex,tx_news_reindex;\
             2024-05-20T12:00:00+00:00;2\n",
            written
        );
    }

    #[test]
    fn queue_read_back_with_same_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.csv");
        let format = QueueCsvFormat::try_from('\t').unwrap();

        let mut wtr = QueueWriter::create(Some(&path), &format).unwrap();
        wtr.serialize(entry()).unwrap();
        wtr.flush().unwrap();
        drop(wtr);

        assert_eq!(vec![entry()], format.read(&path).unwrap());
        assert!(QueueCsvFormat::default().read(&path).is_err());
    }

    #[test]
    fn unsupported_delimiters() {
        assert!(QueueCsvFormat::try_from('"').is_err());
        assert!(QueueCsvFormat::try_from('§').is_err());
    }
}
