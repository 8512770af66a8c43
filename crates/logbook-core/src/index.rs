//! Derived in-memory indices fed by committed events.
//!
//! [`EventSink`] is the seam between ingestion and everything downstream:
//! the scheduler pushes every committed batch and every transient event to
//! each registered sink. [`ScanIndex`] is the sink that keeps the per-system
//! body tree.
//!
//! The body tree is an arena: nodes live in one `Vec` and refer to each
//! other by [`NodeId`], so parent and child links never fight the borrow
//! checker and the index can be rebuilt by replaying events in order.

use crate::event::{BodySignal, EventDetails, EventTag, JournalEvent, TransientEvent};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Receives what the ingestion pipeline produced in one tick.
pub trait EventSink {
    /// `stored` carries `seq` ids and is in file order. `transient` events
    /// were never persisted.
    fn on_new_events(&mut self, stored: &[JournalEvent], transient: &[TransientEvent]);
}

/// A shared sink stays readable by its owner after being handed to a
/// scheduler.
impl<T: EventSink> EventSink for Rc<RefCell<T>> {
    fn on_new_events(&mut self, stored: &[JournalEvent], transient: &[TransientEvent]) {
        self.borrow_mut().on_new_events(stored, transient);
    }
}

// ---------------------------------------------------------------------------
// Node model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Star,
    Barycentre,
    Body,
    Belt,
    BeltCluster,
    Ring,
}

/// The scan that populated a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub seq: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub scan_type: Option<String>,
    pub details: EventDetails,
}

impl ScanRecord {
    /// `Basic` scans carry the least detail; everything else ranks above.
    fn rank(&self) -> u8 {
        match self.scan_type.as_deref() {
            Some("Basic") => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub id: NodeId,
    /// Name component relative to the parent, e.g. `3`, `a`, `A Belt`.
    pub own_name: String,
    pub full_name: Option<String>,
    pub kind: NodeKind,
    pub body_id: Option<i32>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub scan: Option<ScanRecord>,
    /// Latest `SAASignalsFound` result for this body.
    pub signals: Vec<BodySignal>,
    pub genuses: Vec<String>,
}

impl ScanNode {
    fn new(id: NodeId, own_name: String, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            id,
            own_name,
            full_name: None,
            kind,
            body_id: None,
            parent,
            children: Vec::new(),
            scan: None,
            signals: Vec::new(),
            genuses: Vec::new(),
        }
    }
}

/// A signal source reported by the full spectrum scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct FssSignal {
    pub seq: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub name_localised: Option<String>,
    pub signal_type: Option<String>,
    pub is_station: bool,
}

impl FssSignal {
    fn same_source(&self, other: &FssSignal) -> bool {
        self.name == other.name
            && self.signal_type == other.signal_type
            && self.is_station == other.is_station
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemNode {
    pub name: String,
    pub system_address: Option<i64>,
    /// Total body count from an FSS discovery scan.
    pub body_count: Option<u32>,
    pub roots: Vec<NodeId>,
    /// Signal sources in discovery order. A source re-announced on a later
    /// visit is kept once.
    pub fss_signals: Vec<FssSignal>,
    by_body_id: HashMap<i32, NodeId>,
}

impl SystemNode {
    pub fn node_by_body_id(&self, body_id: i32) -> Option<NodeId> {
        self.by_body_id.get(&body_id).copied()
    }

    fn add_fss_signal(&mut self, signal: FssSignal) {
        if !self.fss_signals.iter().any(|s| s.same_source(&signal)) {
            self.fss_signals.push(signal);
        }
    }
}

// ---------------------------------------------------------------------------
// ScanIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScanIndex {
    nodes: Vec<ScanNode>,
    systems: HashMap<String, SystemNode>,
    by_address: HashMap<i64, String>,
    /// Signals for a system address no arrival or scan has named yet.
    pending_signals: HashMap<i64, Vec<FssSignal>>,
    current_system: Option<String>,
}

impl ScanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(&self, name: &str) -> Option<&SystemNode> {
        self.systems.get(&system_key(name))
    }

    pub fn system_by_address(&self, address: i64) -> Option<&SystemNode> {
        self.systems.get(self.by_address.get(&address)?)
    }

    pub fn node(&self, id: NodeId) -> &ScanNode {
        &self.nodes[id.0]
    }

    pub fn current_system(&self) -> Option<&str> {
        self.current_system.as_deref()
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Nodes with a scan behind them, across all systems.
    pub fn scanned_body_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.scan.is_some()).count()
    }

    /// Walk `path` (name components) from the system roots.
    pub fn find(&self, system: &str, path: &[&str]) -> Option<&ScanNode> {
        let sys = self.system(system)?;
        let mut level = &sys.roots;
        let mut found = None;
        for part in path {
            let id = level
                .iter()
                .copied()
                .find(|id| self.nodes[id.0].own_name == *part)?;
            found = Some(id);
            level = &self.nodes[id.0].children;
        }
        found.map(|id| &self.nodes[id.0])
    }

    pub fn apply(&mut self, event: &JournalEvent) {
        match event.details() {
            EventDetails::Arrival {
                star_system,
                system_address,
                ..
            } if !star_system.is_empty() => {
                self.system_mut(&star_system);
                if let Some(address) = system_address {
                    self.note_address(&system_key(&star_system), address);
                }
                self.current_system = Some(star_system);
            }
            EventDetails::DiscoveryScan {
                body_count,
                system_name,
            } => {
                let Some(name) = system_name.or_else(|| self.current_system.clone()) else {
                    return;
                };
                self.system_mut(&name).body_count = body_count;
            }
            EventDetails::SignalDiscovered {
                system_address,
                signal_name,
                signal_name_localised,
                signal_type,
                is_station,
            } => {
                let Some(address) = system_address else {
                    tracing::debug!(signal = %signal_name, "scan index: signal with no system address");
                    return;
                };
                let signal = FssSignal {
                    seq: event.seq,
                    timestamp: event.timestamp,
                    name: signal_name,
                    name_localised: signal_name_localised,
                    signal_type,
                    is_station,
                };
                match self.by_address.get(&address) {
                    Some(key) => {
                        if let Some(sys) = self.systems.get_mut(key) {
                            sys.add_fss_signal(signal);
                        }
                    }
                    None => self.pending_signals.entry(address).or_default().push(signal),
                }
            }
            details @ EventDetails::SurfaceSignals { .. } => self.apply_surface_signals(details),
            details @ EventDetails::Scan { .. } => self.apply_scan(event, details),
            _ => {}
        }
    }

    fn apply_scan(&mut self, event: &JournalEvent, details: EventDetails) {
        let EventDetails::Scan {
            ref body_name,
            body_id,
            ref star_system,
            system_address,
            ref scan_type,
            ref star_type,
            ref parents,
            ..
        } = details
        else {
            return;
        };
        let Some(system) = star_system.clone().or_else(|| self.current_system.clone()) else {
            tracing::debug!(body = %body_name, "scan index: scan with no known system");
            return;
        };
        if body_name.is_empty() {
            return;
        }

        let leaf_is_star = star_type.is_some();
        let key = system_key(&system);
        self.system_mut(&system);
        if let Some(address) = system_address {
            self.note_address(&key, address);
        }
        let Some(leaf) = self.node_for_body(&key, &system, body_name, leaf_is_star) else {
            return;
        };

        // Barycentres are only known by id from the parents chain, which is
        // nearest first. Link them outermost first so each hangs off the
        // next known ancestor, or off the system when there is none.
        let mut outer: Option<NodeId> = None;
        for pref in parents.iter().rev() {
            if pref.kind == "Null" {
                outer = Some(self.barycentre_or_insert(&key, pref.body_id, outer));
            } else if let Some(id) = self.systems[&key].node_by_body_id(pref.body_id) {
                outer = Some(id);
            }
        }

        let record = ScanRecord {
            seq: event.seq,
            timestamp: event.timestamp,
            scan_type: scan_type.clone(),
            details: details.clone(),
        };
        let node = &mut self.nodes[leaf.0];
        node.full_name = Some(body_name.clone());
        if leaf_is_star {
            node.kind = NodeKind::Star;
        }
        if body_id.is_some() {
            node.body_id = body_id;
        }
        let replace = match &node.scan {
            None => true,
            Some(existing) => record.rank() >= existing.rank(),
        };
        if replace {
            node.scan = Some(record);
        }
        if let (Some(id), Some(sys)) = (body_id, self.systems.get_mut(&key)) {
            sys.by_body_id.insert(id, leaf);
        }
    }

    fn apply_surface_signals(&mut self, details: EventDetails) {
        let EventDetails::SurfaceSignals {
            body_name,
            body_id,
            system_address,
            signals,
            genuses,
        } = details
        else {
            return;
        };
        let by_address = system_address.and_then(|a| self.by_address.get(&a).cloned());
        let key = match by_address {
            Some(key) => key,
            None => match self.current_system.clone() {
                Some(name) => {
                    self.system_mut(&name);
                    system_key(&name)
                }
                None => {
                    tracing::debug!(body = %body_name, "scan index: signals with no known system");
                    return;
                }
            },
        };

        let known = body_id.and_then(|id| self.systems[&key].node_by_body_id(id));
        let leaf = match known {
            Some(id) => id,
            None => {
                if body_name.is_empty() {
                    return;
                }
                let system = self.systems[&key].name.clone();
                let Some(id) = self.node_for_body(&key, &system, &body_name, false) else {
                    return;
                };
                id
            }
        };

        let node = &mut self.nodes[leaf.0];
        node.signals = signals;
        node.genuses = genuses;
        if node.full_name.is_none() && !body_name.is_empty() {
            node.full_name = Some(body_name);
        }
        if body_id.is_some() {
            node.body_id = body_id;
        }
        if let (Some(id), Some(sys)) = (body_id, self.systems.get_mut(&key)) {
            sys.by_body_id.insert(id, leaf);
        }
    }

    fn system_mut(&mut self, name: &str) -> &mut SystemNode {
        self.systems
            .entry(system_key(name))
            .or_insert_with(|| SystemNode {
                name: name.to_string(),
                ..Default::default()
            })
    }

    /// Record `address` for the system under `key` and hand it any signals
    /// that arrived before the system was named.
    fn note_address(&mut self, key: &str, address: i64) {
        let Some(sys) = self.systems.get_mut(key) else { return };
        sys.system_address = Some(address);
        for signal in self.pending_signals.remove(&address).unwrap_or_default() {
            sys.add_fss_signal(signal);
        }
        self.by_address.insert(address, key.to_string());
    }

    /// Walk or create the path of named components for `body_name`.
    fn node_for_body(
        &mut self,
        key: &str,
        system: &str,
        body_name: &str,
        leaf_is_star: bool,
    ) -> Option<NodeId> {
        let components = name_components(system, body_name);
        let last = components.len().checked_sub(1)?;
        let mut parent: Option<NodeId> = None;
        for (i, part) in components.iter().enumerate() {
            let kind = if i == last && leaf_is_star {
                NodeKind::Star
            } else {
                kind_of_component(part, i == 0)
            };
            parent = Some(self.child_or_insert(key, parent, part, kind));
        }
        parent
    }

    fn child_or_insert(
        &mut self,
        system: &str,
        parent: Option<NodeId>,
        own_name: &str,
        kind: NodeKind,
    ) -> NodeId {
        let siblings = match parent {
            Some(p) => &self.nodes[p.0].children,
            None => &self.systems[system].roots,
        };
        if let Some(id) = siblings
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].own_name == own_name)
        {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.push_node(system, ScanNode::new(id, own_name.to_string(), kind, parent))
    }

    fn barycentre_or_insert(&mut self, system: &str, body_id: i32, parent: Option<NodeId>) -> NodeId {
        if let Some(id) = self.systems[system].node_by_body_id(body_id) {
            return id;
        }
        let mut node = ScanNode::new(
            NodeId(self.nodes.len()),
            format!("Barycentre {body_id}"),
            NodeKind::Barycentre,
            parent,
        );
        node.body_id = Some(body_id);
        let id = self.push_node(system, node);
        if let Some(sys) = self.systems.get_mut(system) {
            sys.by_body_id.insert(body_id, id);
        }
        id
    }

    /// Append `node` to the arena and link it under its parent, or under the
    /// system roots when it has none.
    fn push_node(&mut self, system: &str, node: ScanNode) -> NodeId {
        let id = node.id;
        let parent = node.parent;
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => {
                if let Some(sys) = self.systems.get_mut(system) {
                    sys.roots.push(id);
                }
            }
        }
        id
    }
}

impl EventSink for ScanIndex {
    fn on_new_events(&mut self, stored: &[JournalEvent], _transient: &[TransientEvent]) {
        for event in stored {
            if matches!(
                event.tag,
                EventTag::Scan
                    | EventTag::FssDiscoveryScan
                    | EventTag::FssSignalDiscovered
                    | EventTag::SaaSignalsFound
                    | EventTag::FsdJump
                    | EventTag::Location
                    | EventTag::CarrierJump
            ) {
                self.apply(event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Name helpers
// ---------------------------------------------------------------------------

fn system_key(name: &str) -> String {
    name.to_lowercase()
}

/// Split a body name into tree components relative to its system.
///
/// `Sol 3 a` in `Sol` gives `["3", "a"]`; `Sol A Belt Cluster 2` gives
/// `["A", "A Belt", "Cluster 2"]`. A name that does not start with the
/// system name as a whole word (or equals it) is a single component.
pub fn name_components(system: &str, body: &str) -> Vec<String> {
    let rest = match body.get(..system.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(system) => &body[system.len()..],
        _ => return vec![body.to_string()],
    };
    if !rest.starts_with(char::is_whitespace) {
        return vec![body.to_string()];
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return vec![body.to_string()];
    }

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match tokens.get(i + 1) {
            Some(&next @ ("Belt" | "Ring")) => {
                // A belt hangs off its star: keep the star component too.
                if next == "Belt" && out.last().map(String::as_str) != Some(token) {
                    out.push(token.to_string());
                }
                out.push(format!("{token} {next}"));
                i += 2;
            }
            Some(next) if token == "Cluster" => {
                out.push(format!("Cluster {next}"));
                i += 2;
            }
            _ => {
                out.push(token.to_string());
                i += 1;
            }
        }
    }
    out
}

fn kind_of_component(part: &str, first: bool) -> NodeKind {
    if part.ends_with(" Belt") {
        NodeKind::Belt
    } else if part.starts_with("Cluster ") {
        NodeKind::BeltCluster
    } else if part.ends_with(" Ring") {
        NodeKind::Ring
    } else if first && part.len() <= 2 && part.chars().all(|c| c.is_ascii_uppercase()) {
        NodeKind::Star
    } else {
        NodeKind::Body
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
