//! Selection, filtering and ordering of the status table for display

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::log_view::LogTarget;
use crate::model::ScriptStatus;
use crate::state::StatusMap;

/// Tab label that shows every group
pub const ALL_GROUPS: &str = "All";

/// "All" first, then the distinct groups sorted
pub fn group_tabs(map: &StatusMap) -> Vec<String> {
    let groups: BTreeSet<&str> = map.values().map(|s| s.group.as_str()).collect();
    std::iter::once(ALL_GROUPS.to_string())
        .chain(groups.into_iter().map(str::to_string))
        .collect()
}

/// Case-insensitive substring match over name and id
#[derive(Clone, Debug, Default)]
pub struct TextFilter {
    pub pattern: Option<String>,
}

impl TextFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, entry: &ScriptStatus) -> bool {
        match &self.pattern {
            None => true,
            Some(p) => {
                let p = p.to_lowercase();
                entry.name.to_lowercase().contains(&p) || entry.id.to_lowercase().contains(&p)
            }
        }
    }

    pub fn set(&mut self, pattern: String) {
        self.pattern = if pattern.is_empty() {
            None
        } else {
            Some(pattern)
        };
    }

    pub fn clear(&mut self) {
        self.pattern = None;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Name,
    Id,
    Status,
    Pid,
    Cpu,
    Memory,
    Uptime,
    Group,
}

impl SortColumn {
    pub const ALL: [SortColumn; 8] = [
        Self::Name,
        Self::Id,
        Self::Status,
        Self::Pid,
        Self::Cpu,
        Self::Memory,
        Self::Uptime,
        Self::Group,
    ];

    pub fn cycle(self) -> Self {
        let idx = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::Id => "ID",
            Self::Status => "STATUS",
            Self::Pid => "PID",
            Self::Cpu => "CPU",
            Self::Memory => "MEM",
            Self::Uptime => "UPTIME",
            Self::Group => "GROUP",
        }
    }

    /// Ascending order; stopped entries have no figures and sort first
    fn compare(&self, a: &ScriptStatus, b: &ScriptStatus) -> Ordering {
        match self {
            Self::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            Self::Id => a.id.cmp(&b.id),
            Self::Status => a.status_label().cmp(b.status_label()),
            Self::Pid => a.pid().cmp(&b.pid()),
            Self::Cpu => cmp_f64(a.cpu_percent(), b.cpu_percent()),
            Self::Memory => cmp_f64(a.memory_mb(), b.memory_mb()),
            // Longer uptime means an earlier start
            Self::Uptime => match (a.start_time(), b.start_time()) {
                (Some(x), Some(y)) => y.cmp(&x),
                (x, y) => x.is_some().cmp(&y.is_some()),
            },
            Self::Group => a.group.cmp(&b.group),
        }
    }
}

fn cmp_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (x, y) => x.is_some().cmp(&y.is_some()),
    }
}

/// Everything that decides which rows show and in what order
#[derive(Clone, Debug, Default)]
pub struct ListView {
    pub group: Option<String>,
    pub filter: TextFilter,
    pub sort: SortColumn,
    pub descending: bool,
}

impl ListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` or "All" selects every group
    pub fn select_group(&mut self, group: Option<String>) {
        self.group = group.filter(|g| g != ALL_GROUPS);
    }

    /// Same column flips direction, a new column sorts ascending
    pub fn sort_by(&mut self, column: SortColumn) {
        if self.sort == column {
            self.descending = !self.descending;
        } else {
            self.sort = column;
            self.descending = false;
        }
    }

    pub fn rows<'a>(&self, map: &'a StatusMap) -> Vec<&'a ScriptStatus> {
        let mut rows: Vec<&ScriptStatus> = map
            .values()
            .filter(|s| self.group.as_deref().is_none_or(|g| s.group == g))
            .filter(|s| self.filter.matches(s))
            .collect();
        rows.sort_by(|a, b| {
            let ord = self.sort.compare(a, b).then_with(|| a.id.cmp(&b.id));
            if self.descending { ord.reverse() } else { ord }
        });
        rows
    }
}

/// Manager log first, then scripts ordered by name
pub fn log_targets(map: &StatusMap) -> Vec<(LogTarget, String)> {
    let mut scripts: Vec<&ScriptStatus> = map.values().collect();
    scripts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
    std::iter::once((LogTarget::Manager, "Manager".to_string()))
        .chain(
            scripts
                .into_iter()
                .map(|s| (LogTarget::Script(s.id.clone()), s.name.clone())),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{running, stopped};

    fn table(entries: Vec<ScriptStatus>) -> StatusMap {
        entries.into_iter().map(|e| (e.id.clone(), e)).collect()
    }

    #[test]
    fn test_group_tabs_all_first() {
        let mut ops = stopped("b");
        ops.group = "Ops".into();
        let map = table(vec![stopped("a"), ops, stopped("c")]);
        assert_eq!(group_tabs(&map), vec!["All", "Default", "Ops"]);
    }

    #[test]
    fn test_filter_matches_name_or_id() {
        let mut entry = stopped("etl-1");
        entry.name = "Nightly Import".into();
        let mut filter = TextFilter::new();
        filter.set("IMPORT".into());
        assert!(filter.matches(&entry));
        filter.set("etl".into());
        assert!(filter.matches(&entry));
        filter.set("web".into());
        assert!(!filter.matches(&entry));
        filter.set(String::new());
        assert!(filter.matches(&entry));
    }

    #[test]
    fn test_sort_toggle_direction() {
        let map = table(vec![
            running("a", 5.0, 10.0),
            running("b", 50.0, 1.0),
            stopped("c"),
        ]);
        let mut view = ListView::new();
        view.sort_by(SortColumn::Cpu);
        let ids: Vec<&str> = view.rows(&map).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        view.sort_by(SortColumn::Cpu);
        assert!(view.descending);
        let ids: Vec<&str> = view.rows(&map).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        view.sort_by(SortColumn::Memory);
        assert!(!view.descending);
    }

    #[test]
    fn test_group_selection() {
        let mut ops = stopped("b");
        ops.group = "Ops".into();
        let map = table(vec![stopped("a"), ops]);
        let mut view = ListView::new();
        view.select_group(Some("Ops".into()));
        assert_eq!(view.rows(&map).len(), 1);
        view.select_group(Some(ALL_GROUPS.into()));
        assert_eq!(view.rows(&map).len(), 2);
    }

    #[test]
    fn test_log_targets_manager_first() {
        let mut z = stopped("1");
        z.name = "zeta".into();
        let mut a = stopped("2");
        a.name = "Alpha".into();
        let targets = log_targets(&table(vec![z, a]));
        assert_eq!(targets[0].0, LogTarget::Manager);
        assert_eq!(targets[1].1, "Alpha");
        assert_eq!(targets[2].0, LogTarget::Script("1".into()));
    }

    #[test]
    fn test_sort_column_cycle_wraps() {
        assert_eq!(SortColumn::Group.cycle(), SortColumn::Name);
        assert_eq!(SortColumn::Name.cycle(), SortColumn::Id);
    }
}
