// Process tree termination scoped to one worker
use log::{debug, warn};
use std::collections::HashMap;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// All descendants of `root`, deepest first. `root` itself is not included.
pub fn descendants(root: u32) -> Vec<u32> {
    let sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    );

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    collect_leaves_first(root, &children)
}

fn collect_leaves_first(root: u32, children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    // Pre-order walk, reversed, puts every child before its parent
    let mut order = Vec::new();
    let mut frontier = vec![root];
    while let Some(pid) = frontier.pop() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if kid != root && !order.contains(&kid) {
                    order.push(kid);
                    frontier.push(kid);
                }
            }
        }
    }
    order.reverse();
    order
}

/// Kill every descendant of `root`, leaves first. The root is left to the
/// caller, which owns its `Child` handle.
pub fn kill_descendants(root: u32) -> usize {
    let pids = descendants(root);
    if pids.is_empty() {
        return 0;
    }

    let sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    );

    let mut killed = 0;
    for pid in pids {
        match sys.process(Pid::from_u32(pid)) {
            Some(process) if process.kill() => {
                debug!("Killed worker child process {}", pid);
                killed += 1;
            }
            Some(_) => warn!("Failed to kill worker child process {}", pid),
            // Already gone
            None => {}
        }
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaves_come_before_parents() {
        let mut children = HashMap::new();
        children.insert(1, vec![2, 3]);
        children.insert(2, vec![4]);
        children.insert(4, vec![5]);
        children.insert(9, vec![10]);

        let order = collect_leaves_first(1, &children);
        assert_eq!(order.len(), 4);
        let pos = |pid| order.iter().position(|p| *p == pid).unwrap();
        assert!(pos(5) < pos(4));
        assert!(pos(4) < pos(2));
        assert!(!order.contains(&10));
        assert!(!order.contains(&1));
    }

    #[test]
    fn test_unknown_root_has_no_descendants() {
        assert!(collect_leaves_first(42, &HashMap::new()).is_empty());
    }
}
