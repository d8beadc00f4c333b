//! Relationship edges: the per-identifier, per-field state containers.
//!
//! Every edge keeps two layers, [`Layer::Remote`] (last known canonical) and [`Layer::Local`]
//! (what the application currently sees). Methods here only ever touch `self`; keeping the
//! other side of a relationship in step is the job of the graph's operation handlers.

use enumset::{EnumSet, EnumSetType};
use serde::{ser::SerializeSeq, Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::{collections::HashSet, sync::Arc};

use super::{
    definition::{EdgeDefinition, EdgeKind},
    operations::Links,
};
use crate::identifier::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Layer {
    Local,
    Remote,
}

impl Layer {
    pub fn both() -> [Layer; 2] {
        [Layer::Local, Layer::Remote]
    }
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
pub enum EdgeFlag {
    /// Data (possibly empty) was delivered for this edge at least once.
    HasReceivedData,
    /// The last remote state was empty.
    IsEmpty,
    /// A link is known but the remote membership it points to has not been confirmed.
    IsStale,
    /// A member was unloaded while this edge still referenced it.
    HasDematerializedInverse,
    HasFailedLoadAttempt,
    /// A change notification for this edge is queued.
    IsDirty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EdgeState(pub EnumSet<EdgeFlag>);

impl EdgeState {
    pub fn has_received_data(&self) -> bool {
        self.0.contains(EdgeFlag::HasReceivedData)
    }

    pub fn is_empty(&self) -> bool {
        self.0.contains(EdgeFlag::IsEmpty)
    }

    pub fn is_stale(&self) -> bool {
        self.0.contains(EdgeFlag::IsStale)
    }

    pub fn has_dematerialized_inverse(&self) -> bool {
        self.0.contains(EdgeFlag::HasDematerializedInverse)
    }

    pub fn has_failed_load_attempt(&self) -> bool {
        self.0.contains(EdgeFlag::HasFailedLoadAttempt)
    }

    pub fn is_dirty(&self) -> bool {
        self.0.contains(EdgeFlag::IsDirty)
    }

    pub fn set(&mut self, flag: EdgeFlag, on: bool) {
        if on {
            self.0.insert(flag);
        } else {
            self.0.remove(flag);
        }
    }
}

/// An ordered set of identifiers. The membership set is always exactly the set form of the
/// order.
#[derive(Debug, Clone, Default)]
pub struct MemberList {
    members: HashSet<Identifier>,
    order: Vec<Identifier>,
}

impl PartialEq for MemberList {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for MemberList {}

impl Serialize for MemberList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.order.len()))?;
        for member in self.order.iter() {
            seq.serialize_element(member)?;
        }
        seq.end()
    }
}

impl FromIterator<Identifier> for MemberList {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut list = MemberList::default();
        for identifier in iter {
            list.push(identifier);
        }
        list
    }
}

impl MemberList {
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.members.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identifier> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[Identifier] {
        &self.order
    }

    pub fn members(&self) -> &HashSet<Identifier> {
        &self.members
    }

    /// Append unless present.
    pub fn push(&mut self, identifier: Identifier) -> bool {
        if !self.members.insert(identifier.clone()) {
            return false;
        }
        self.order.push(identifier);
        true
    }

    /// Insert at `index` (clamped to the end) unless present.
    pub fn insert(&mut self, index: usize, identifier: Identifier) -> bool {
        if !self.members.insert(identifier.clone()) {
            return false;
        }
        let index = index.min(self.order.len());
        self.order.insert(index, identifier);
        true
    }

    pub fn remove(&mut self, identifier: &Identifier) -> bool {
        if !self.members.remove(identifier) {
            return false;
        }
        self.order.retain(|member| member != identifier);
        true
    }

    /// Rewrite `from` to `to` in place. If `to` is already a member, `from` is dropped instead.
    pub fn rewrite(&mut self, from: &Identifier, to: &Identifier) -> bool {
        if !self.members.contains(from) {
            return false;
        }
        if self.members.contains(to) {
            return self.remove(from);
        }
        self.members.remove(from);
        self.members.insert(to.clone());
        for member in self.order.iter_mut() {
            if member == from {
                *member = to.clone();
            }
        }
        true
    }

    pub fn same_members(&self, other: &MemberList) -> bool {
        self.members == other.members
    }

    pub fn is_coherent(&self) -> bool {
        self.members.len() == self.order.len()
            && self.order.iter().all(|member| self.members.contains(member))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceEdge {
    pub identifier: Identifier,
    #[serde(skip)]
    pub definition: Arc<EdgeDefinition>,
    pub local: Option<Identifier>,
    pub remote: Option<Identifier>,
    pub meta: Option<Value>,
    pub links: Option<Links>,
    pub state: EdgeState,
}

impl ResourceEdge {
    pub fn value(&self, layer: Layer) -> Option<&Identifier> {
        match layer {
            Layer::Local => self.local.as_ref(),
            Layer::Remote => self.remote.as_ref(),
        }
    }

    /// Replace the value on one layer, returning the previous value.
    pub fn set(&mut self, layer: Layer, value: Option<Identifier>) -> Option<Identifier> {
        match layer {
            Layer::Local => std::mem::replace(&mut self.local, value),
            Layer::Remote => std::mem::replace(&mut self.remote, value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionEdge {
    pub identifier: Identifier,
    #[serde(skip)]
    pub definition: Arc<EdgeDefinition>,
    pub local: MemberList,
    pub remote: MemberList,
    /// Local members the remote layer does not (yet) contain.
    #[serde(skip)]
    pub additions: Option<HashSet<Identifier>>,
    /// Remote members removed locally.
    #[serde(skip)]
    pub removals: Option<HashSet<Identifier>>,
    pub meta: Option<Value>,
    pub links: Option<Links>,
    pub state: EdgeState,
}

fn insert_into(set: &mut Option<HashSet<Identifier>>, identifier: &Identifier) {
    set.get_or_insert_with(HashSet::new)
        .insert(identifier.clone());
}

fn remove_from(set: &mut Option<HashSet<Identifier>>, identifier: &Identifier) -> bool {
    let Some(members) = set.as_mut() else {
        return false;
    };
    let removed = members.remove(identifier);
    if members.is_empty() {
        *set = None;
    }
    removed
}

fn contains_in(set: &Option<HashSet<Identifier>>, identifier: &Identifier) -> bool {
    set.as_ref()
        .map(|members| members.contains(identifier))
        .unwrap_or(false)
}

impl CollectionEdge {
    pub fn members(&self, layer: Layer) -> &MemberList {
        match layer {
            Layer::Local => &self.local,
            Layer::Remote => &self.remote,
        }
    }

    fn members_mut(&mut self, layer: Layer) -> &mut MemberList {
        match layer {
            Layer::Local => &mut self.local,
            Layer::Remote => &mut self.remote,
        }
    }

    pub fn is_addition(&self, identifier: &Identifier) -> bool {
        contains_in(&self.additions, identifier)
    }

    pub fn is_removal(&self, identifier: &Identifier) -> bool {
        contains_in(&self.removals, identifier)
    }

    /// Add to one layer; `index` splices instead of appending.
    pub fn add(&mut self, layer: Layer, identifier: &Identifier, index: Option<usize>) -> bool {
        let inserted = match index {
            Some(index) => self.members_mut(layer).insert(index, identifier.clone()),
            None => self.members_mut(layer).push(identifier.clone()),
        };
        if inserted && layer == Layer::Local && !remove_from(&mut self.removals, identifier) {
            if !self.remote.contains(identifier) {
                insert_into(&mut self.additions, identifier);
            }
        }
        inserted
    }

    pub fn remove(&mut self, layer: Layer, identifier: &Identifier) -> bool {
        let removed = self.members_mut(layer).remove(identifier);
        if removed && layer == Layer::Local && !remove_from(&mut self.additions, identifier) {
            if self.remote.contains(identifier) {
                insert_into(&mut self.removals, identifier);
            }
        }
        removed
    }

    /// Reorder one layer. `order` must hold exactly the current members.
    pub fn set_order(&mut self, layer: Layer, order: Vec<Identifier>) -> bool {
        let list = self.members_mut(layer);
        if list.order == order {
            return false;
        }
        debug_assert!(order.len() == list.len() && order.iter().all(|m| list.contains(m)));
        list.order = order;
        true
    }

    /// Rebuild the local layer from the remote layer, keeping local intent: remote order minus
    /// local removals, then local additions (and unpersisted members) the remote does not hold.
    ///
    /// Returns the members that left and joined the local layer.
    pub fn rebuild_local<F: Fn(&Identifier) -> bool>(
        &mut self,
        is_new: F,
    ) -> (Vec<Identifier>, Vec<Identifier>) {
        let mut next = MemberList::default();
        for member in self.remote.iter() {
            if !self.is_removal(member) {
                next.push(member.clone());
            }
        }
        for member in self.local.iter() {
            if !self.remote.contains(member) && (self.is_addition(member) || is_new(member)) {
                next.push(member.clone());
            }
        }
        self.replace_local(next)
    }

    /// Drop all local intent and mirror the remote layer.
    pub fn reset_local(&mut self) -> (Vec<Identifier>, Vec<Identifier>) {
        let next = self.remote.clone();
        self.replace_local(next)
    }

    fn replace_local(&mut self, next: MemberList) -> (Vec<Identifier>, Vec<Identifier>) {
        let left = self
            .local
            .iter()
            .filter(|member| !next.contains(member))
            .cloned()
            .collect::<Vec<_>>();
        let joined = next
            .iter()
            .filter(|member| !self.local.contains(member))
            .cloned()
            .collect::<Vec<_>>();
        self.local = next;
        self.normalize_intent();
        (left, joined)
    }

    /// Recompute additions and removals from the two layers.
    pub fn normalize_intent(&mut self) {
        let additions = self
            .local
            .iter()
            .filter(|member| !self.remote.contains(member))
            .cloned()
            .collect::<HashSet<_>>();
        let removals = self
            .remote
            .iter()
            .filter(|member| !self.local.contains(member))
            .cloned()
            .collect::<HashSet<_>>();
        self.additions = (!additions.is_empty()).then_some(additions);
        self.removals = (!removals.is_empty()).then_some(removals);
    }

    pub fn rewrite(&mut self, from: &Identifier, to: &Identifier) -> bool {
        let mut changed = self.local.rewrite(from, to);
        changed |= self.remote.rewrite(from, to);
        for set in [&mut self.additions, &mut self.removals] {
            if remove_from(set, from) {
                insert_into(set, to);
            }
        }
        self.prune_intent();
        changed
    }

    /// Drop intent a rewrite made redundant, such as an addition the remote layer already holds.
    fn prune_intent(&mut self) {
        let (local, remote) = (&self.local, &self.remote);
        if let Some(additions) = self.additions.as_mut() {
            additions.retain(|member| local.contains(member) && !remote.contains(member));
        }
        if let Some(removals) = self.removals.as_mut() {
            removals.retain(|member| remote.contains(member) && !local.contains(member));
        }
        if self.additions.as_ref().is_some_and(HashSet::is_empty) {
            self.additions = None;
        }
        if self.removals.as_ref().is_some_and(HashSet::is_empty) {
            self.removals = None;
        }
    }
}

/// Back-references for a field that declares no inverse. Never surfaced outside the graph.
#[derive(Debug, Clone, Serialize)]
pub struct ImplicitEdge {
    pub identifier: Identifier,
    #[serde(skip)]
    pub definition: Arc<EdgeDefinition>,
    pub local: HashSet<Identifier>,
    pub remote: HashSet<Identifier>,
    pub state: EdgeState,
}

impl ImplicitEdge {
    pub fn members(&self, layer: Layer) -> &HashSet<Identifier> {
        match layer {
            Layer::Local => &self.local,
            Layer::Remote => &self.remote,
        }
    }

    pub fn members_mut(&mut self, layer: Layer) -> &mut HashSet<Identifier> {
        match layer {
            Layer::Local => &mut self.local,
            Layer::Remote => &mut self.remote,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum Edge {
    Resource(ResourceEdge),
    Collection(CollectionEdge),
    Implicit(ImplicitEdge),
}

impl Edge {
    pub fn new(identifier: Identifier, definition: Arc<EdgeDefinition>) -> Self {
        match definition.kind {
            EdgeKind::Resource => Edge::Resource(ResourceEdge {
                identifier,
                definition,
                local: None,
                remote: None,
                meta: None,
                links: None,
                state: EdgeState::default(),
            }),
            EdgeKind::Collection => Edge::Collection(CollectionEdge {
                identifier,
                definition,
                local: MemberList::default(),
                remote: MemberList::default(),
                additions: None,
                removals: None,
                meta: None,
                links: None,
                state: EdgeState::default(),
            }),
            EdgeKind::Implicit => Edge::Implicit(ImplicitEdge {
                identifier,
                definition,
                local: HashSet::new(),
                remote: HashSet::new(),
                state: EdgeState::default(),
            }),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        match self {
            Edge::Resource(edge) => &edge.identifier,
            Edge::Collection(edge) => &edge.identifier,
            Edge::Implicit(edge) => &edge.identifier,
        }
    }

    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        match self {
            Edge::Resource(edge) => &edge.definition,
            Edge::Collection(edge) => &edge.definition,
            Edge::Implicit(edge) => &edge.definition,
        }
    }

    pub fn kind(&self) -> EdgeKind {
        self.definition().kind
    }

    pub fn state(&self) -> &EdgeState {
        match self {
            Edge::Resource(edge) => &edge.state,
            Edge::Collection(edge) => &edge.state,
            Edge::Implicit(edge) => &edge.state,
        }
    }

    pub fn state_mut(&mut self) -> &mut EdgeState {
        match self {
            Edge::Resource(edge) => &mut edge.state,
            Edge::Collection(edge) => &mut edge.state,
            Edge::Implicit(edge) => &mut edge.state,
        }
    }

    pub fn links(&self) -> Option<&Links> {
        match self {
            Edge::Resource(edge) => edge.links.as_ref(),
            Edge::Collection(edge) => edge.links.as_ref(),
            Edge::Implicit(_) => None,
        }
    }

    pub fn meta(&self) -> Option<&Value> {
        match self {
            Edge::Resource(edge) => edge.meta.as_ref(),
            Edge::Collection(edge) => edge.meta.as_ref(),
            Edge::Implicit(_) => None,
        }
    }

    pub fn contains(&self, layer: Layer, identifier: &Identifier) -> bool {
        match self {
            Edge::Resource(edge) => edge.value(layer) == Some(identifier),
            Edge::Collection(edge) => edge.members(layer).contains(identifier),
            Edge::Implicit(edge) => edge.members(layer).contains(identifier),
        }
    }

    /// Members of one layer; ordered for collections.
    pub fn members(&self, layer: Layer) -> Vec<Identifier> {
        match self {
            Edge::Resource(edge) => edge.value(layer).cloned().into_iter().collect(),
            Edge::Collection(edge) => edge.members(layer).as_slice().to_vec(),
            Edge::Implicit(edge) => edge.members(layer).iter().cloned().collect(),
        }
    }

    /// Every identifier referenced on either layer.
    pub fn referenced(&self) -> HashSet<Identifier> {
        Layer::both()
            .into_iter()
            .flat_map(|layer| self.members(layer))
            .collect()
    }

    pub fn layer_is_empty(&self, layer: Layer) -> bool {
        match self {
            Edge::Resource(edge) => edge.value(layer).is_none(),
            Edge::Collection(edge) => edge.members(layer).is_empty(),
            Edge::Implicit(edge) => edge.members(layer).is_empty(),
        }
    }

    /// Whether local and remote membership differ.
    pub fn is_changed(&self) -> bool {
        match self {
            Edge::Resource(edge) => edge.local != edge.remote,
            Edge::Collection(edge) => edge.local != edge.remote,
            Edge::Implicit(edge) => edge.local != edge.remote,
        }
    }

    /// Put `value` on one layer, ignoring any other edge. A value displaced from a resource edge
    /// comes back in [`InsertOutcome::Displaced`] so the caller can detach it from its own inverse.
    pub(crate) fn insert(
        &mut self,
        layer: Layer,
        value: &Identifier,
        index: Option<usize>,
    ) -> InsertOutcome {
        match self {
            Edge::Resource(edge) => {
                if edge.value(layer) == Some(value) {
                    return InsertOutcome::Unchanged;
                }
                match edge.set(layer, Some(value.clone())) {
                    Some(displaced) => InsertOutcome::Displaced(displaced),
                    None => InsertOutcome::Inserted,
                }
            }
            Edge::Collection(edge) => {
                if edge.add(layer, value, index) {
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::Unchanged
                }
            }
            Edge::Implicit(edge) => {
                if edge.members_mut(layer).insert(value.clone()) {
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::Unchanged
                }
            }
        }
    }

    /// Remove `value` from one layer, ignoring any other edge.
    pub(crate) fn delete(&mut self, layer: Layer, value: &Identifier) -> bool {
        match self {
            Edge::Resource(edge) => {
                if edge.value(layer) != Some(value) {
                    return false;
                }
                edge.set(layer, None);
                true
            }
            Edge::Collection(edge) => edge.remove(layer, value),
            Edge::Implicit(edge) => edge.members_mut(layer).remove(value),
        }
    }

    /// Rewrite every reference to `from` into `to` on both layers.
    pub(crate) fn rewrite(&mut self, from: &Identifier, to: &Identifier) -> bool {
        match self {
            Edge::Resource(edge) => {
                let mut changed = false;
                for layer in Layer::both() {
                    if edge.value(layer) == Some(from) {
                        edge.set(layer, Some(to.clone()));
                        changed = true;
                    }
                }
                changed
            }
            Edge::Collection(edge) => edge.rewrite(from, to),
            Edge::Implicit(edge) => {
                let mut changed = false;
                for layer in Layer::both() {
                    let members = edge.members_mut(layer);
                    if members.remove(from) {
                        members.insert(to.clone());
                        changed = true;
                    }
                }
                changed
            }
        }
    }

    pub(crate) fn rebind(&mut self, owner: &Identifier) {
        match self {
            Edge::Resource(edge) => edge.identifier = owner.clone(),
            Edge::Collection(edge) => edge.identifier = owner.clone(),
            Edge::Implicit(edge) => edge.identifier = owner.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    Unchanged,
    Inserted,
    Displaced(Identifier),
}
