use chrono::{DateTime, Local};
use std::fs::File;
use std::fs::OpenOptions;
use std::io::prelude::*;

use crate::options::*;

pub struct LoggingContext {
    pub log_file: File,
}

impl LoggingContext {
    pub fn new(options: &impl IOOptions) -> Result<Self, String> {
        // Create the output directory
        let output_path = options.output_path();
        std::fs::create_dir_all(output_path.clone()).map_err(|_| String::from("Cannot create output directory"))?;

        // Create the log file
        let log_path = output_path.join("engine_log.txt");
        let log_file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(log_path)
            .map_err(|_| String::from("Cannot create log file"))?;
        Ok(Self { log_file })
    }

    pub fn log(&mut self, s: &str) -> Result<(), String> {
        let now: DateTime<Local> = Local::now();
        let log_str = format!("[{}] {}\n", now, s);
        self.log_file
            .write_all(log_str.as_bytes())
            .map_err(|_| String::from("Cannot write to log file"))?;
        print!("{}", log_str);
        Ok(())
    }

    pub fn warn(&mut self, s: &str) -> Result<(), String> {
        self.log(format!("warning: {}", s).as_str())
    }

    pub fn log_dumping_call_prefixes(&mut self, num_groups: usize) -> Result<(), String> {
        self.log(format!("Dumping {} call prefix groups...", num_groups).as_str())
    }

    pub fn log_dumped_call_prefixes(&mut self, num_files: usize) -> Result<(), String> {
        self.log(format!("{} call prefix files have been written", num_files).as_str())
    }

    pub fn warn_losing_test_case(&mut self) -> Result<(), String> {
        self.warn("unable to get symbolic solution, losing test case")
    }

    pub fn warn_cannot_write_file(&mut self, filename: &str) -> Result<(), String> {
        self.warn(format!("cannot write output file {}, skipping it", filename).as_str())
    }

    pub fn warn_truncated_call_record(&mut self, callee: &str) -> Result<(), String> {
        self.warn(format!("call record for {} has an absent traced out-value, dump truncated", callee).as_str())
    }
}
