pub mod expectations;
pub mod pod_control;
pub mod replication;
pub mod store;
pub mod workqueue;

pub use expectations::ExpectationStore;
pub use pod_control::{PodControl, RealPodControl};
pub use replication::ReplicationManager;
pub use store::Store;
pub use workqueue::WorkQueue;
