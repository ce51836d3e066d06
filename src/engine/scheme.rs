//! Routing tables: which node runs next given the last node and status.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use super::task::TaskStatus;
use crate::error::{EvoError, Result};

/// Where a task goes next.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Run the named node.
    Node(String),
    /// The task is finished.
    Terminal,
}

impl Transition {
    /// Transition to the named node.
    pub fn to(name: impl Into<String>) -> Self {
        Transition::Node(name.into())
    }
}

impl From<&str> for Transition {
    fn from(name: &str) -> Self {
        Transition::Node(name.to_string())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Node(name) => f.write_str(name),
            Transition::Terminal => f.write_str("<terminal>"),
        }
    }
}

#[derive(Debug, Clone)]
enum Route {
    Always(Transition),
    ByStatus(HashMap<TaskStatus, Transition>),
}

/// A routing table keyed by the last executed node.
///
/// The entry route (no node executed yet) always exists. A node's route is
/// either unconditional or keyed by status; a status-keyed route covers both
/// `Success` and `Fail`.
///
/// # Examples
///
/// ```
/// use u_evograph::engine::{Scheme, TaskStatus, Transition};
///
/// let scheme = Scheme::builder()
///     .entry("a")
///     .on("a", TaskStatus::Success, "b")
///     .on("a", TaskStatus::Fail, Transition::Terminal)
///     .always("b", Transition::Terminal)
///     .build()
///     .unwrap();
///
/// assert_eq!(scheme.next(Some("a"), TaskStatus::Success).unwrap(), Transition::to("b"));
/// assert_eq!(scheme.next(Some("a"), TaskStatus::Fail).unwrap(), Transition::Terminal);
/// ```
#[derive(Debug, Clone)]
pub struct Scheme {
    entry: Transition,
    routes: HashMap<String, Route>,
}

/// Builder for [`Scheme`].
#[derive(Debug, Default)]
pub struct SchemeBuilder {
    entry: Option<Transition>,
    routes: HashMap<String, Route>,
    errors: Vec<String>,
}

impl SchemeBuilder {
    /// Sets the first transition of every new task.
    pub fn entry(mut self, target: impl Into<Transition>) -> Self {
        self.entry = Some(target.into());
        self
    }

    /// Routes every task leaving `from` to `target`, whatever its status.
    pub fn always(mut self, from: &str, target: impl Into<Transition>) -> Self {
        if self.routes.contains_key(from) {
            self.errors.push(format!("node '{from}' is routed twice"));
        } else {
            self.routes.insert(from.to_string(), Route::Always(target.into()));
        }
        self
    }

    /// Routes tasks leaving `from` with `status` to `target`.
    pub fn on(mut self, from: &str, status: TaskStatus, target: impl Into<Transition>) -> Self {
        if status == TaskStatus::Pending {
            self.errors
                .push(format!("node '{from}' routes the pending status"));
            return self;
        }
        match self
            .routes
            .entry(from.to_string())
            .or_insert_with(|| Route::ByStatus(HashMap::new()))
        {
            Route::ByStatus(map) => {
                if map.insert(status, target.into()).is_some() {
                    self.errors
                        .push(format!("node '{from}' routes status {status} twice"));
                }
            }
            Route::Always(_) => self
                .errors
                .push(format!("node '{from}' mixes unconditional and status routes")),
        }
        self
    }

    /// Checks the table's internal consistency.
    ///
    /// Node names are checked later, against a concrete node set, by
    /// [`Scheme::validate`].
    pub fn build(self) -> Result<Scheme> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(EvoError::config(first));
        }
        let entry = self
            .entry
            .ok_or_else(|| EvoError::config("scheme has no entry transition"))?;
        for (name, route) in &self.routes {
            if let Route::ByStatus(map) = route {
                for status in [TaskStatus::Success, TaskStatus::Fail] {
                    if !map.contains_key(&status) {
                        return Err(EvoError::config(format!(
                            "node '{name}' has no route for status {status}"
                        )));
                    }
                }
            }
        }
        Ok(Scheme {
            entry,
            routes: self.routes,
        })
    }
}

impl Scheme {
    /// Starts a builder.
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::default()
    }

    /// Runs `names` in order regardless of status, then terminates.
    pub fn sequential(names: &[&str]) -> Result<Self> {
        let Some(first) = names.first() else {
            return Err(EvoError::config("sequential scheme needs at least one node"));
        };
        let mut builder = Self::builder().entry(*first);
        for pair in names.windows(2) {
            builder = builder.always(pair[0], pair[1]);
        }
        if let Some(last) = names.last() {
            builder = builder.always(last, Transition::Terminal);
        }
        builder.build()
    }

    /// Resolves the next transition for a task.
    ///
    /// `last` is `None` for a task no node has run on yet.
    pub fn next(&self, last: Option<&str>, status: TaskStatus) -> Result<Transition> {
        let Some(name) = last else {
            return Ok(self.entry.clone());
        };
        match self.routes.get(name) {
            Some(Route::Always(target)) => Ok(target.clone()),
            Some(Route::ByStatus(map)) => map.get(&status).cloned().ok_or_else(|| {
                EvoError::Contract(format!("task left node '{name}' with status {status}"))
            }),
            None => Err(EvoError::config(format!("no route from node '{name}'"))),
        }
    }

    /// Node names reachable from the entry, in discovery order.
    pub fn reachable(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([&self.entry]);
        while let Some(transition) = queue.pop_front() {
            let Transition::Node(name) = transition else {
                continue;
            };
            if !seen.insert(name.as_str()) {
                continue;
            }
            order.push(name.clone());
            match self.routes.get(name) {
                Some(Route::Always(target)) => queue.push_back(target),
                Some(Route::ByStatus(map)) => {
                    // fixed order keeps discovery deterministic
                    for status in [TaskStatus::Success, TaskStatus::Fail] {
                        if let Some(target) = map.get(&status) {
                            queue.push_back(target);
                        }
                    }
                }
                None => {}
            }
        }
        order
    }

    /// Checks the table against the names of the nodes that will execute it.
    ///
    /// Every referenced node must exist and every reachable node needs an
    /// outgoing route.
    pub fn validate<'a>(&self, nodes: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let known: HashSet<&str> = nodes.into_iter().collect();
        let mut referenced: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        let targets = std::iter::once(&self.entry).chain(self.routes.values().flat_map(|r| match r {
            Route::Always(t) => vec![t],
            Route::ByStatus(map) => map.values().collect(),
        }));
        for target in targets {
            if let Transition::Node(name) = target {
                referenced.push(name.as_str());
            }
        }
        if let Some(unknown) = referenced.iter().find(|n| !known.contains(*n)) {
            return Err(EvoError::config(format!("scheme references unknown node '{unknown}'")));
        }
        if let Some(dangling) = self.reachable().iter().find(|n| !self.routes.contains_key(*n)) {
            return Err(EvoError::config(format!("node '{dangling}' has no outgoing route")));
        }
        Ok(())
    }
}
