use std::path::PathBuf;

pub trait IOOptions {
    fn output_path(&self) -> PathBuf;

    fn test_file_path(&self, suffix: &str, id: usize) -> PathBuf {
        self.output_path().join(format!("test{:06}.{}", id, suffix))
    }

    fn call_path_file_path(&self, id: usize) -> PathBuf {
        self.output_path().join(format!("call-path{:06}.txt", id))
    }

    fn call_prefix_file_path(&self, id: usize) -> PathBuf {
        self.output_path().join(format!("call-prefix{:06}.txt", id))
    }

    fn metadata_file_path(&self) -> PathBuf {
        self.output_path().join("run_metadata.json")
    }
}

pub trait OutputOptions {
    // Suppress every per-test artifact
    fn no_output(&self) -> bool;

    fn write_kqueries(&self) -> bool;

    fn write_paths(&self) -> bool;

    fn write_sym_paths(&self) -> bool;

    fn write_cov(&self) -> bool;

    fn write_test_info(&self) -> bool;

    fn dump_call_traces(&self) -> bool;

    fn dump_call_trace_prefixes(&self) -> bool;

    // 0 means no limit
    fn stop_after_n_tests(&self) -> usize;

    fn exit_on_error(&self) -> bool;
}

pub trait MergeOptions {
    fn use_merge(&self) -> bool;

    fn debug_log_merge(&self) -> bool;
}
