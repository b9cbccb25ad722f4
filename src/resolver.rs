//! Relationship resolution
//!
//! Turns a list of requested modules into a consistent, ordered change set.
//! Relationships are walked breadth first in three phases: every pending
//! `depends` is resolved before any `recommends`, and every `recommends`
//! before any `suggests`. Hard dependencies must be met; soft ones are
//! best effort.
//!
//! # Examples
//!
//! ```
//! use ckan::{CkanModule, GameVersion, Registry, RelationshipDescriptor};
//! use ckan::resolver::{RelationshipResolver, RelationshipResolverOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut a = CkanModule::new("A", "1.0");
//! a.depends.push(RelationshipDescriptor::new("B"));
//!
//! let mut registry = Registry::empty();
//! registry.add_available(a);
//! registry.add_available(CkanModule::new("B", "1.0"));
//!
//! let resolver = RelationshipResolver::new(
//!     &registry,
//!     GameVersion::Any,
//!     RelationshipResolverOptions::default(),
//! );
//! let resolution = resolver.resolve(&["A"])?;
//!
//! let order: Vec<&str> = resolution.modules().iter().map(|m| m.identifier.as_str()).collect();
//! assert_eq!(order, vec!["B", "A"]);
//! # Ok(())
//! # }
//! ```

use crate::error::{Kraken, KrakenResult};
use crate::sanity::SanityChecker;
use crate::{CkanModule, GameVersion, ModuleVersion, Registry, RelationshipDescriptor};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

/// Knobs controlling how far the resolver reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipResolverOptions {
    /// Install recommended modules
    pub with_recommends: bool,
    /// Install modules suggested by the requested modules
    pub with_suggests: bool,
    /// Install modules suggested by anything in the plan
    pub with_all_suggests: bool,
    /// Skip ambiguous virtual packages instead of failing
    pub without_toomanyprovides_kraken: bool,
    /// Allow conflicting or incomplete results
    pub without_enforce_consistency: bool,
}

impl Default for RelationshipResolverOptions {
    fn default() -> Self {
        Self {
            with_recommends: true,
            with_suggests: false,
            with_all_suggests: false,
            without_toomanyprovides_kraken: false,
            without_enforce_consistency: false,
        }
    }
}

impl RelationshipResolverOptions {
    /// Hard dependencies only.
    pub fn dependencies_only() -> Self {
        Self {
            with_recommends: false,
            ..Self::default()
        }
    }
}

/// Why a module ended up in a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionReason {
    UserRequested,
    Depends { parent: String },
    Recommended { parent: String },
    Suggested { parent: String },
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::UserRequested => f.write_str("requested by user"),
            SelectionReason::Depends { parent } => write!(f, "dependency of {}", parent),
            SelectionReason::Recommended { parent } => write!(f, "recommended by {}", parent),
            SelectionReason::Suggested { parent } => write!(f, "suggested by {}", parent),
        }
    }
}

/// A recommendation or suggestion the options left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftRelationship {
    pub identifier: String,
    pub wanted_by: String,
}

/// The outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    modules: Vec<CkanModule>,
    reasons: HashMap<String, SelectionReason>,
    recommendations: Vec<SoftRelationship>,
    suggestions: Vec<SoftRelationship>,
}

impl Resolution {
    /// Modules to install, dependencies before their dependents.
    pub fn modules(&self) -> &[CkanModule] {
        &self.modules
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.identifier.as_str()).collect()
    }

    pub fn get(&self, identifier: &str) -> Option<&CkanModule> {
        self.modules.iter().find(|m| m.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    pub fn reason(&self, identifier: &str) -> Option<&SelectionReason> {
        self.reasons.get(identifier)
    }

    pub fn recommendations(&self) -> &[SoftRelationship] {
        &self.recommendations
    }

    pub fn suggestions(&self) -> &[SoftRelationship] {
        &self.suggestions
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Resolve `requested` against `registry` for the given game version.
pub fn resolve<S: AsRef<str>>(
    requested: &[S],
    options: RelationshipResolverOptions,
    registry: &Registry,
    game_version: GameVersion,
) -> KrakenResult<Resolution> {
    RelationshipResolver::new(registry, game_version, options).resolve(requested)
}

pub struct RelationshipResolver<'a> {
    registry: &'a Registry,
    game_version: GameVersion,
    options: RelationshipResolverOptions,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(
        registry: &'a Registry,
        game_version: GameVersion,
        options: RelationshipResolverOptions,
    ) -> Self {
        Self {
            registry,
            game_version,
            options,
        }
    }

    pub fn options(&self) -> &RelationshipResolverOptions {
        &self.options
    }

    /// Resolve requests of the form `identifier` or `identifier=version`.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> KrakenResult<Resolution> {
        self.resolve_with_removals::<S, &str>(requested, &[])
    }

    /// Resolve as if the modules in `removing` were already uninstalled.
    pub fn resolve_with_removals<S: AsRef<str>, R: AsRef<str>>(
        &self,
        requested: &[S],
        removing: &[R],
    ) -> KrakenResult<Resolution> {
        let mut state = ResolveState::new(self, removing);

        // Concrete identifiers and pins go first so a requested provider can
        // settle a virtual request regardless of where it appears
        let (concrete, virtual_names): (Vec<&str>, Vec<&str>) = requested
            .iter()
            .map(|r| r.as_ref())
            .partition(|r| self.names_concrete_module(r));
        for request in concrete.into_iter().chain(virtual_names) {
            state.seed(request)?;
        }

        while let Some((phase, identifier)) = state.queue.pop() {
            state.process(phase, &identifier)?;
        }

        state.finish()
    }

    fn names_concrete_module(&self, request: &str) -> bool {
        let request = request.trim();
        request.contains('=') || self.registry.available_module(request).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Depends,
    Recommends,
    Suggests,
}

/// Pending work, drained one phase at a time.
#[derive(Default)]
struct ResolveQueue {
    depends: VecDeque<String>,
    recommends: VecDeque<String>,
    suggests: VecDeque<String>,
}

impl ResolveQueue {
    fn push(&mut self, identifier: &str) {
        self.depends.push_back(identifier.to_string());
        self.recommends.push_back(identifier.to_string());
        self.suggests.push_back(identifier.to_string());
    }

    fn pop(&mut self) -> Option<(Phase, String)> {
        if let Some(id) = self.depends.pop_front() {
            return Some((Phase::Depends, id));
        }
        if let Some(id) = self.recommends.pop_front() {
            return Some((Phase::Recommends, id));
        }
        self.suggests.pop_front().map(|id| (Phase::Suggests, id))
    }
}

enum Satisfaction {
    Satisfied,
    Unsatisfied,
    /// The name is in the plan, but at a version outside the bounds
    WrongVersion(String),
}

struct ResolveState<'r, 'a> {
    resolver: &'r RelationshipResolver<'a>,
    /// Identifier → selected module, in selection order
    plan: IndexMap<String, CkanModule>,
    /// Provided name → identifier of the planned module providing it
    aliases: HashMap<String, String>,
    reasons: HashMap<String, SelectionReason>,
    requested: HashSet<String>,
    removing: HashSet<String>,
    queue: ResolveQueue,
    recommendations: Vec<SoftRelationship>,
    suggestions: Vec<SoftRelationship>,
}

impl<'r, 'a> ResolveState<'r, 'a> {
    fn new<R: AsRef<str>>(resolver: &'r RelationshipResolver<'a>, removing: &[R]) -> Self {
        Self {
            resolver,
            plan: IndexMap::new(),
            aliases: HashMap::new(),
            reasons: HashMap::new(),
            requested: HashSet::new(),
            removing: removing.iter().map(|r| r.as_ref().to_string()).collect(),
            queue: ResolveQueue::default(),
            recommendations: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn registry(&self) -> &'a Registry {
        self.resolver.registry
    }

    fn game_version(&self) -> &GameVersion {
        &self.resolver.game_version
    }

    fn options(&self) -> &RelationshipResolverOptions {
        &self.resolver.options
    }

    /// Installed modules that stay installed: not removed, not replaced by the plan.
    fn remaining_installed(&self) -> Vec<&'a CkanModule> {
        self.registry()
            .installed_modules()
            .filter(|m| !self.removing.contains(m.identifier()) && !self.plan.contains_key(m.identifier()))
            .map(|m| &m.source_module)
            .collect()
    }

    fn remaining_dlls(&self) -> Vec<&'a str> {
        self.registry()
            .installed_dll_names()
            .into_iter()
            .filter(|name| !self.removing.contains(*name))
            .collect()
    }

    fn seed(&mut self, request: &str) -> KrakenResult<()> {
        let module = self.module_for_request(request)?;

        if let Some(existing) = self.plan.get(&module.identifier) {
            if existing.version != module.version {
                return Err(Kraken::inconsistent(format!(
                    "Both {} and {} were requested",
                    existing, module
                )));
            }
            return Ok(());
        }

        if let Some(other) = self.conflicting(&module) {
            if !self.options().without_enforce_consistency {
                return Err(Kraken::inconsistent(format!(
                    "{} conflicts with {}",
                    module, other
                )));
            }
            warn!("{} conflicts with {}, continuing anyway", module, other);
        }

        self.requested.insert(module.identifier.clone());
        self.add(module, SelectionReason::UserRequested);
        Ok(())
    }

    fn module_for_request(&self, request: &str) -> KrakenResult<CkanModule> {
        let request = request.trim();

        if let Some((identifier, version)) = request.split_once('=') {
            let module = self
                .registry()
                .get_module_by_version(identifier, &ModuleVersion::new(version))
                .ok_or_else(|| Kraken::ModuleNotFound {
                    identifier: identifier.to_string(),
                    version: Some(version.to_string()),
                })?;
            if !module.is_compatible(self.game_version()) {
                warn!(
                    "{} is not compatible with game version {}, installing as requested",
                    module,
                    self.game_version()
                );
            }
            return Ok(module.clone());
        }

        let wanted = RelationshipDescriptor::new(request);
        let candidates = self.registry().find_candidates(&wanted, self.game_version());
        match candidates.as_slice() {
            [] => Err(Kraken::not_found(request)),
            [only] => Ok((*only).clone()),
            many => {
                // A provider requested alongside settles the choice
                if let Some(chosen) = many.iter().find(|m| self.plan.contains_key(&m.identifier)) {
                    return Ok((*chosen).clone());
                }
                Err(Kraken::TooManyModsProvide {
                    requested: request.to_string(),
                    candidates: many.iter().map(|m| (*m).clone()).collect(),
                })
            }
        }
    }

    fn add(&mut self, module: CkanModule, reason: SelectionReason) {
        debug!("Selected {} ({})", module, reason);
        let identifier = module.identifier.clone();
        for name in &module.provides {
            self.aliases
                .entry(name.clone())
                .or_insert_with(|| identifier.clone());
        }
        self.reasons.insert(identifier.clone(), reason);
        self.queue.push(&identifier);
        self.plan.insert(identifier, module);
    }

    /// Identifier of a planned or installed module conflicting with `module`.
    fn conflicting(&self, module: &CkanModule) -> Option<String> {
        if let Some(other) = self
            .plan
            .values()
            .find(|other| module.conflicts_with(other))
        {
            return Some(other.identifier.clone());
        }
        if let Some(other) = self
            .remaining_installed()
            .into_iter()
            .find(|other| module.conflicts_with(other))
        {
            return Some(other.identifier.clone());
        }
        let dlls = self.remaining_dlls();
        module
            .conflicts
            .iter()
            .find(|c| c.name != module.identifier && dlls.contains(&c.name.as_str()))
            .map(|c| c.name.clone())
    }

    fn satisfaction(&self, relationship: &RelationshipDescriptor) -> Satisfaction {
        if let Some(planned) = self.plan.get(&relationship.name) {
            return if relationship.version_within_bounds(&planned.version) {
                Satisfaction::Satisfied
            } else {
                Satisfaction::WrongVersion(planned.to_string())
            };
        }
        if self.aliases.contains_key(&relationship.name) {
            return Satisfaction::Satisfied;
        }

        let installed = self.remaining_installed();
        if installed.iter().any(|m| relationship.matches(m)) {
            return Satisfaction::Satisfied;
        }
        if self.remaining_dlls().contains(&relationship.name.as_str()) {
            return Satisfaction::Satisfied;
        }
        Satisfaction::Unsatisfied
    }

    fn candidates(&self, relationship: &RelationshipDescriptor) -> Vec<CkanModule> {
        self.registry()
            .find_candidates(relationship, self.game_version())
            .into_iter()
            .filter(|m| !self.removing.contains(&m.identifier))
            .cloned()
            .collect()
    }

    fn process(&mut self, phase: Phase, identifier: &str) -> KrakenResult<()> {
        let Some(parent) = self.plan.get(identifier).cloned() else {
            return Ok(());
        };

        match phase {
            Phase::Depends => {
                for relationship in &parent.depends {
                    self.resolve_depends(&parent, relationship)?;
                }
            }
            Phase::Recommends => {
                for relationship in &parent.recommends {
                    self.resolve_soft(&parent, relationship, phase)?;
                }
            }
            Phase::Suggests => {
                for relationship in &parent.suggests {
                    self.resolve_soft(&parent, relationship, phase)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_depends(
        &mut self,
        parent: &CkanModule,
        relationship: &RelationshipDescriptor,
    ) -> KrakenResult<()> {
        relationship.validate(&parent.identifier)?;
        if relationship.name == parent.identifier {
            return Err(Kraken::bad_metadata(
                &parent.identifier,
                "module depends on itself",
            ));
        }
        let enforce = !self.options().without_enforce_consistency;

        match self.satisfaction(relationship) {
            Satisfaction::Satisfied => return Ok(()),
            Satisfaction::WrongVersion(selected) => {
                if enforce {
                    return Err(Kraken::inconsistent(format!(
                        "{} depends on {}, but {} is selected",
                        parent, relationship, selected
                    )));
                }
                warn!(
                    "{} depends on {}, but {} is selected",
                    parent, relationship, selected
                );
                return Ok(());
            }
            Satisfaction::Unsatisfied => {}
        }

        let mut candidates = self.candidates(relationship);
        match candidates.len() {
            0 => Err(Kraken::ModuleNotFound {
                identifier: relationship.name.clone(),
                version: bounds_label(relationship),
            }),
            1 => {
                let candidate = candidates.remove(0);
                if let Some(other) = self.conflicting(&candidate) {
                    if enforce {
                        return Err(Kraken::inconsistent(format!(
                            "{} conflicts with {}",
                            candidate, other
                        )));
                    }
                    warn!("{} conflicts with {}, continuing anyway", candidate, other);
                }
                self.add(
                    candidate,
                    SelectionReason::Depends {
                        parent: parent.identifier.clone(),
                    },
                );
                Ok(())
            }
            _ => {
                if self.options().without_toomanyprovides_kraken {
                    debug!(
                        "Several modules provide {} for {}, leaving it unresolved",
                        relationship.name, parent
                    );
                    return Ok(());
                }
                Err(Kraken::TooManyModsProvide {
                    requested: relationship.name.clone(),
                    candidates,
                })
            }
        }
    }

    fn resolve_soft(
        &mut self,
        parent: &CkanModule,
        relationship: &RelationshipDescriptor,
        phase: Phase,
    ) -> KrakenResult<()> {
        if let Err(e) = relationship.validate(&parent.identifier) {
            warn!("Ignoring malformed relationship: {}", e);
            return Ok(());
        }
        if !matches!(self.satisfaction(relationship), Satisfaction::Unsatisfied) {
            return Ok(());
        }

        let options = *self.options();
        let enabled = match phase {
            Phase::Recommends => options.with_recommends,
            Phase::Suggests => {
                options.with_all_suggests
                    || (options.with_suggests && self.requested.contains(&parent.identifier))
            }
            Phase::Depends => true,
        };

        let mut candidates = self.candidates(relationship);

        if !enabled {
            if !candidates.is_empty() {
                let entry = SoftRelationship {
                    identifier: relationship.name.clone(),
                    wanted_by: parent.identifier.clone(),
                };
                let list = if phase == Phase::Recommends {
                    &mut self.recommendations
                } else {
                    &mut self.suggestions
                };
                if !list.contains(&entry) {
                    list.push(entry);
                }
            }
            return Ok(());
        }

        match candidates.len() {
            0 => {
                debug!("Nothing provides {} wanted by {}", relationship, parent);
                Ok(())
            }
            1 => {
                let candidate = candidates.remove(0);
                if let Some(other) = self.conflicting(&candidate) {
                    debug!(
                        "Skipping {} wanted by {}: conflicts with {}",
                        candidate, parent, other
                    );
                    return Ok(());
                }
                let parent_id = parent.identifier.clone();
                let reason = if phase == Phase::Recommends {
                    SelectionReason::Recommended { parent: parent_id }
                } else {
                    SelectionReason::Suggested { parent: parent_id }
                };
                self.add(candidate, reason);
                Ok(())
            }
            _ => {
                if options.without_toomanyprovides_kraken {
                    debug!(
                        "Several modules provide {} wanted by {}, skipping",
                        relationship.name, parent
                    );
                    return Ok(());
                }
                Err(Kraken::TooManyModsProvide {
                    requested: relationship.name.clone(),
                    candidates,
                })
            }
        }
    }

    fn finish(self) -> KrakenResult<Resolution> {
        if !self.options().without_enforce_consistency {
            let mut modules = self.remaining_installed();
            modules.extend(self.plan.values());
            SanityChecker::enforce_consistency(&modules, &self.remaining_dlls())?;
        }

        let modules = self.dependency_order();
        info!("Resolved {} modules", modules.len());

        Ok(Resolution {
            modules,
            reasons: self.reasons,
            recommendations: self.recommendations,
            suggestions: self.suggestions,
        })
    }

    /// Depth-first post-order over `depends` edges, seeded in selection order.
    fn dependency_order(&self) -> Vec<CkanModule> {
        let mut visited = HashSet::new();
        let mut ordered = Vec::with_capacity(self.plan.len());
        for identifier in self.plan.keys() {
            self.visit(identifier, &mut visited, &mut ordered);
        }
        ordered
    }

    fn visit(&self, identifier: &str, visited: &mut HashSet<String>, ordered: &mut Vec<CkanModule>) {
        if !visited.insert(identifier.to_string()) {
            return;
        }
        let Some(module) = self.plan.get(identifier) else {
            return;
        };
        for dep in &module.depends {
            let target = if self.plan.contains_key(&dep.name) {
                Some(dep.name.as_str())
            } else {
                self.aliases.get(&dep.name).map(String::as_str)
            };
            if let Some(target) = target {
                self.visit(target, visited, ordered);
            }
        }
        ordered.push(module.clone());
    }
}

fn bounds_label(relationship: &RelationshipDescriptor) -> Option<String> {
    if !relationship.has_bounds() {
        return None;
    }
    let full = relationship.to_string();
    Some(full[relationship.name.len()..].trim().to_string())
}
