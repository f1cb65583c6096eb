//! Locating the game process beneath a session pane.
//!
//! The pane's own pid may be a shell wrapping the server, so the tree
//! below it is searched for a process running the launched executable.
//! All functions here perform blocking I/O and should be called via
//! `spawn_blocking`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use sysinfo::{Pid, System};
use tracing::{debug, trace};

/// Prevents runaway walks over pathological trees.
const MAX_DEPTH: usize = 8;

/// Returns the pid of the first process at or below `root` whose
/// executable matches `program`, or `root` itself if none does.
pub fn find_program_pid(root: u32, program: &Path) -> u32 {
    let Some(wanted) = program.file_name() else {
        return root;
    };

    let system = System::new_all();

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut queue = VecDeque::from([(Pid::from_u32(root), 0usize)]);
    while let Some((pid, depth)) = queue.pop_front() {
        if let Some(process) = system.process(pid) {
            let exe_matches = process
                .exe()
                .and_then(Path::file_name)
                .map(|name| name == wanted)
                .unwrap_or(false);
            if exe_matches || process.name() == wanted {
                debug!(root, pid = pid.as_u32(), depth, "Found server process");
                return pid.as_u32();
            }
        }

        if depth >= MAX_DEPTH {
            continue;
        }
        for child in children.get(&pid).into_iter().flatten() {
            queue.push_back((*child, depth + 1));
        }
    }

    trace!(root, program = ?program, "No matching descendant, using pane pid");
    root
}
