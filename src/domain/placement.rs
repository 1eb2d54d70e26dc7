// ============================================================
// Layer 3 — Device Placement
// ============================================================
// What hardware a run may use, and where one trainer ends up.
// In distributed mode every worker is handed a WorkerLaunch at
// spawn time; nothing is derived from environment variables.

use serde::{Deserialize, Serialize};

/// Accelerators visible to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInventory {
    pub accelerator_available: bool,
    pub device_count:          usize,
}

impl DeviceInventory {
    pub fn cpu_only() -> Self {
        Self { accelerator_available: false, device_count: 0 }
    }

    pub fn accelerators(device_count: usize) -> Self {
        Self { accelerator_available: device_count > 0, device_count }
    }
}

/// The rendezvous message one distributed worker starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLaunch {
    /// Index among this node's workers.
    pub local_rank:   usize,
    /// Rank across all nodes: `node_rank * num_gpus + local_rank`.
    pub world_rank:   usize,
    pub world_size:   usize,
    /// Accelerator index this worker drives.
    pub device:       usize,
    pub dist_url:     String,
    pub dist_backend: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePlacement {
    Cpu,
    Accelerator(usize),
    Distributed(WorkerLaunch),
}

impl DevicePlacement {
    pub fn world_rank(&self) -> usize {
        match self {
            Self::Distributed(launch) => launch.world_rank,
            _ => 0,
        }
    }

    /// Rank 0 owns prompts and the shared log directory.
    pub fn is_primary(&self) -> bool {
        self.world_rank() == 0
    }
}

impl std::fmt::Display for DevicePlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator(i) => write!(f, "accelerator:{i}"),
            Self::Distributed(l) => write!(
                f,
                "accelerator:{} (rank {}/{} via {} @ {})",
                l.device, l.world_rank, l.world_size, l.dist_backend, l.dist_url
            ),
        }
    }
}
