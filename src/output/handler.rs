use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::call_trace::*;
use crate::engine::*;
use crate::options::*;
use crate::utils::*;

use super::ktest::*;

/// Drop the interpreter's uniquifying `_<digits>` suffix from a symbolic
/// object name. Anything else, including `_1a` or a bare trailing
/// underscore, stays untouched.
pub fn strip_uniquifying_suffix(name: &str) -> String {
    match name.rfind('_') {
        Some(idx) => {
            let suffix = &name[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                name[..idx].to_string()
            } else {
                name.to_string()
            }
        }
        None => name.to_string(),
    }
}

/// Materializes every on-disk artifact of a run: test records, call traces,
/// call-prefix summaries, and the run metadata.
pub struct OutputHandler<'a, O>
where
    O: IOOptions + OutputOptions,
{
    pub options: &'a O,
    logging: LoggingContext,
    call_tree: CallTree,
    num_total_tests: usize,
    num_generated_tests: usize,
    call_path_index: usize,
    call_prefix_index: usize,
    metadata: MetaData,
    // Engine invocation arguments recorded into every test record
    args: Vec<String>,
}

impl<'a, O> OutputHandler<'a, O>
where
    O: IOOptions + OutputOptions,
{
    pub fn new(options: &'a O, args: Vec<String>) -> Result<Self, String> {
        let logging = LoggingContext::new(options)?;
        Ok(Self {
            options,
            logging,
            call_tree: CallTree::new(),
            num_total_tests: 0,
            num_generated_tests: 0,
            call_path_index: 1,
            call_prefix_index: 0,
            metadata: MetaData::new(),
            args,
        })
    }

    pub fn num_test_cases(&self) -> usize {
        self.num_generated_tests
    }

    pub fn num_paths_explored(&self) -> usize {
        self.metadata.paths_explored
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn call_tree(&self) -> &CallTree {
        &self.call_tree
    }

    pub fn dump_metadata(&self) -> Result<(), String> {
        self.metadata.dump(self.options.metadata_file_path())
    }

    fn write_or_warn(&mut self, path: &Path, content: &str) -> Result<(), String> {
        if std::fs::write(path, content).is_err() {
            self.logging.warn_cannot_write_file(&path.display().to_string())?;
        }
        Ok(())
    }

    /// Outputs all files (.ktest, .kquery, .cov etc.) describing one
    /// terminated state. Per-file I/O failures are warnings, not errors; a
    /// carried error message combined with `exit_on_error` is returned as a
    /// fatal error after the artifacts are written.
    pub fn process_test_case(
        &mut self,
        state: &ExecutionState,
        interp: &mut dyn Interpreter,
        error_message: Option<&str>,
        error_suffix: &str,
    ) -> Result<(), String> {
        if !self.options.no_output() {
            let solution = interp.symbolic_solution(state);
            if solution.is_none() {
                self.logging.warn_losing_test_case()?;
            }

            let start_time = SystemTime::now();
            self.num_total_tests += 1;
            let id = self.num_total_tests;

            if let Some((objects, havocs)) = solution {
                let ktest = KTest {
                    args: self.args.clone(),
                    sym_argvs: 0,
                    sym_argv_len: 0,
                    objects: objects
                        .into_iter()
                        .map(|(name, bytes)| KTestObject {
                            name: strip_uniquifying_suffix(&name),
                            bytes,
                        })
                        .collect(),
                    havocs: havocs
                        .into_iter()
                        .map(|h| {
                            let words = mask_words(h.value.len());
                            let mut mask = h.mask;
                            mask.resize(words, 0);
                            KTestHavoc {
                                name: h.name,
                                bytes: h.value,
                                mask,
                            }
                        })
                        .collect(),
                };
                let ktest_path = self.options.test_file_path("ktest", id);
                match ktest.write_to(&ktest_path) {
                    Ok(()) => {
                        self.num_generated_tests += 1;
                        self.metadata.tests_generated += 1;
                    }
                    Err(_) => {
                        self.logging.warn("unable to write output test case, losing it")?;
                    }
                }

                if self.options.dump_call_traces() {
                    let query = interp.constraint_log(state);
                    let (content, truncated) =
                        render_call_trace_with_query(&query, &state.call_path, &state.constraints);
                    if let Some(callee) = truncated {
                        self.logging.warn_truncated_call_record(&callee)?;
                        self.metadata.truncated_call_records += 1;
                    }
                    let path = self.options.test_file_path("call_path", id);
                    self.write_or_warn(&path, &content)?;
                }
            }

            if let Some(message) = error_message {
                let path = self.options.test_file_path(error_suffix, id);
                self.write_or_warn(&path, message)?;
            }

            if self.options.write_paths() {
                let content: String = state.concrete_branches.iter().map(|b| format!("{}\n", b)).collect();
                let path = self.options.test_file_path("path", id);
                self.write_or_warn(&path, &content)?;
            }

            if error_message.is_some() || self.options.write_kqueries() {
                let constraints = interp.constraint_log(state);
                let path = self.options.test_file_path("kquery", id);
                self.write_or_warn(&path, &constraints)?;
            }

            if self.options.write_sym_paths() {
                let content: String = state.symbolic_branches.iter().map(|b| format!("{}\n", b)).collect();
                let path = self.options.test_file_path("sym.path", id);
                self.write_or_warn(&path, &content)?;
            }

            if self.options.write_cov() {
                let cov = interp.covered_lines(state);
                let mut content = String::new();
                for (file, lines) in cov.iter() {
                    for line in lines.iter() {
                        content.push_str(&format!("{}:{}\n", file, line));
                    }
                }
                let path = self.options.test_file_path("cov", id);
                self.write_or_warn(&path, &content)?;
            }

            if self.options.stop_after_n_tests() > 0 && self.num_generated_tests == self.options.stop_after_n_tests() {
                interp.set_halt_execution(true);
            }

            if self.options.write_test_info() {
                let elapsed = start_time.elapsed().map(|d| d.as_secs_f64()).unwrap_or(0.0);
                let path = self.options.test_file_path("info", id);
                self.write_or_warn(&path, &format!("Time to generate test case: {}s\n", elapsed))?;
            }
        }

        if let Some(message) = error_message {
            if self.options.exit_on_error() {
                return Err(format!("exiting on error:\n{}", message));
            }
        }
        Ok(())
    }

    /// A path terminated: record it in the call tree and, when trace dumping
    /// is on, write its plaintext trace.
    pub fn process_call_path(&mut self, state: &ExecutionState) -> Result<(), String> {
        self.metadata.paths_explored += 1;
        if !self.options.dump_call_traces() && !self.options.dump_call_trace_prefixes() {
            return Ok(());
        }
        let id = self.call_path_index;
        self.call_path_index += 1;
        if self.options.dump_call_trace_prefixes() {
            self.call_tree.add_call_path(&state.call_path, id);
        }
        if !self.options.dump_call_traces() {
            return Ok(());
        }
        let (content, truncated) = render_call_path(&state.call_path, &state.constraints);
        if let Some(callee) = truncated {
            self.logging.warn_truncated_call_record(&callee)?;
            self.metadata.truncated_call_records += 1;
        }
        let path = self.options.call_path_file_path(id);
        self.write_or_warn(&path, &content)?;
        self.metadata.call_paths_dumped += 1;
        Ok(())
    }

    /// Engine shutdown: one prefix file per invocation-equivalent group of
    /// sibling tips, across the whole tree.
    pub fn dump_call_path_prefixes(&mut self) -> Result<(), String> {
        if !self.options.dump_call_trace_prefixes() {
            return Ok(());
        }
        let num_groups = self.call_tree.count_prefix_groups();
        self.logging.log_dumping_call_prefixes(num_groups)?;

        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:50.cyan/white} {pos:>5}/{len:5} {percent}% {msg}")
            .progress_chars("##-");
        let pb = ProgressBar::new(num_groups as u64).with_style(style);
        pb.set_message("Call prefixes");

        let options = self.options;
        let OutputHandler {
            call_tree,
            logging,
            call_prefix_index,
            metadata,
            ..
        } = self;
        {
            let mut sink = PrefixFileSink {
                options,
                index: call_prefix_index,
                logging,
                progress: &pb,
                metadata,
            };
            call_tree.dump_call_prefixes_sexpr(&mut Vec::new(), &mut sink)?;
        }
        pb.finish_and_clear();

        let emitted = self.metadata.call_prefixes_dumped;
        self.logging.log_dumped_call_prefixes(emitted)
    }
}

struct PrefixFileSink<'h, O>
where
    O: IOOptions,
{
    options: &'h O,
    index: &'h mut usize,
    logging: &'h mut LoggingContext,
    progress: &'h ProgressBar,
    metadata: &'h mut MetaData,
}

impl<'h, O> PrefixSink for PrefixFileSink<'h, O>
where
    O: IOOptions,
{
    fn emit_prefix_file(&mut self, content: &str) -> Result<(), String> {
        *self.index += 1;
        let path: PathBuf = self.options.call_prefix_file_path(*self.index);
        if std::fs::write(&path, content).is_err() {
            self.logging.warn_cannot_write_file(&path.display().to_string())?;
        } else {
            self.metadata.call_prefixes_dumped += 1;
        }
        self.progress.inc(1);
        Ok(())
    }

    fn warn_truncated(&mut self, callee: &str) {
        let _ = self.logging.warn_truncated_call_record(callee);
        self.metadata.truncated_call_records += 1;
    }
}
