pub mod daemon;

pub use daemon::pod_workers::PodWorkers;
