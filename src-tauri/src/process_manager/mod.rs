pub mod process_tree;
pub mod python_worker;

pub use process_tree::kill_descendants;
pub use python_worker::{get_python_path, get_workers_dir, WorkerInvocation};
