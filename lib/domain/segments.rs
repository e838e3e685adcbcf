//! The memory domain.
//!
//! `Segments` keeps a table of memory regions and, for each region, the
//! fields known to hold a value. A field is a byte span of its region whose
//! content is tracked as a numeric variable of the child domain. Loads and
//! stores are resolved to a region, checked against its bounds, and then
//! turned into assignments over field variables. Every other instruction
//! goes to the child domain unchanged.
//!
//! Regions are either absolute, placed at a fixed address, or symbolic,
//! placed at an unknown address held by a base variable. Accesses into a
//! symbolic region must be expressed over its base variable, as in
//! `load [base + i]`. An address that mentions no base variable is looked
//! up among the absolute regions by its range of values.

use crate::analysis::{WarningKind, WarningMessage, WarningsContainer};
use crate::collections::{AvlMap, IntTrie, RangeTree};
use crate::domain::{feasible, AbstractPointer, Domain, QueryChannel};
use crate::il::{Instruction, Linear, MemVar, NumVar, Rhs};
use crate::numeric::{FiniteRange, Range};
use crate::Error;
use bitflags::bitflags;
use log::debug;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Access permissions of a region.
    #[derive(Deserialize, Serialize)]
    pub struct RegionPermissions: u32 {
        const NONE  = 0b00;
        const READ  = 0b01;
        const WRITE = 0b10;
        const ALL   = 0b11;
    }
}

/// Where a region starts.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum RegionBase {
    Absolute(BigInt),
    /// At the unknown value of this variable.
    Symbolic(NumVar),
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Region {
    memvar: MemVar,
    base: RegionBase,
    size: u64,
    permissions: RegionPermissions,
}

impl Region {
    pub fn memvar(&self) -> &MemVar {
        &self.memvar
    }

    pub fn base(&self) -> &RegionBase {
        &self.base
    }

    /// The size of this region in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn permissions(&self) -> RegionPermissions {
        self.permissions
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.base {
            RegionBase::Absolute(address) => write!(
                f,
                "{}: {} bytes at 0x{:x} {:?}",
                self.memvar, self.size, address, self.permissions
            ),
            RegionBase::Symbolic(base) => write!(
                f,
                "{}: {} bytes at {} {:?}",
                self.memvar, self.size, base, self.permissions
            ),
        }
    }
}

/// The region an address refers to.
enum Target {
    /// `pointer` points into `region`, whose first byte is at `origin` in the
    /// terms of the pointer's offset.
    Region {
        region: Region,
        pointer: AbstractPointer,
        origin: Linear,
    },
    Unknown,
    Imprecise,
}

/// Tracks memory regions and their contents on top of a numeric domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segments<D> {
    child: D,
    /// Region descriptions, keyed by the stamp of their `MemVar`.
    regions: IntTrie<Region>,
    absolute: RangeTree<MemVar>,
    /// Base variable to symbolic region.
    symbolic: AvlMap<NumVar, MemVar>,
    fields: AvlMap<MemVar, RangeTree<NumVar>>,
    warnings: WarningsContainer,
}

impl<D: Domain> Segments<D> {
    /// A state without any regions.
    pub fn new(child: D) -> Segments<D> {
        Segments {
            child,
            regions: IntTrie::new(),
            absolute: RangeTree::new(),
            symbolic: AvlMap::new(),
            fields: AvlMap::new(),
            warnings: WarningsContainer::new(),
        }
    }

    pub fn child(&self) -> &D {
        &self.child
    }

    pub fn region(&self, memvar: &MemVar) -> Result<&Region, Error> {
        self.regions
            .get(memvar.stamp())
            .ok_or_else(|| Error::UnknownRegion {
                region: memvar.clone(),
            })
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// The variable holding the `size` bytes at `offset` of `memvar`.
    pub fn field(&self, memvar: &MemVar, offset: u64, size: u64) -> Option<&NumVar> {
        let span = FiniteRange::span(offset, size)?;
        self.fields.get(memvar)?.get(&span)
    }

    /// Add a region of `size` bytes at `address`.
    ///
    /// Fails with `Error::InvariantViolation` if the region is empty or
    /// overlaps another absolute region.
    pub fn add_absolute_region<S: AsRef<str>>(
        &self,
        name: S,
        address: u64,
        size: u64,
        permissions: RegionPermissions,
    ) -> Result<(Segments<D>, MemVar), Error> {
        let span = FiniteRange::span(address, size)
            .ok_or_else(|| Error::invariant(format!("region {} is empty", name.as_ref())))?;
        if self.absolute.has_overlaps(&span) {
            return Err(Error::invariant(format!(
                "region {} at {} overlaps an existing region",
                name.as_ref(),
                span
            )));
        }
        let memvar = MemVar::fresh(name);
        let region = Region {
            memvar: memvar.clone(),
            base: RegionBase::Absolute(BigInt::from(address)),
            size,
            permissions,
        };
        let mut state = self.with_region(region);
        state.absolute = state.absolute.insert(span, memvar.clone());
        Ok((state, memvar))
    }

    /// Add a region of `size` bytes at an unknown address. Returns the new
    /// state, the region and its base variable.
    pub fn add_symbolic_region<S: AsRef<str>>(
        &self,
        name: S,
        size: u64,
        permissions: RegionPermissions,
    ) -> Result<(Segments<D>, MemVar, NumVar), Error> {
        if size == 0 {
            return Err(Error::invariant(format!(
                "region {} is empty",
                name.as_ref()
            )));
        }
        let base = NumVar::fresh(format!("{}.base", name.as_ref()));
        let memvar = MemVar::fresh(name);
        let region = Region {
            memvar: memvar.clone(),
            base: RegionBase::Symbolic(base.clone()),
            size,
            permissions,
        };
        let mut state = self.with_region(region);
        state.symbolic = state.symbolic.insert(base.clone(), memvar.clone());
        state.child = state.child.introduce(&base, &Range::top())?;
        Ok((state, memvar, base))
    }

    fn with_region(&self, region: Region) -> Segments<D> {
        let memvar = region.memvar.clone();
        Segments {
            regions: self.regions.insert(memvar.stamp(), region),
            fields: self.fields.insert(memvar, RangeTree::new()),
            ..self.clone()
        }
    }

    fn with_child(&self, child: D, warnings: WarningsContainer) -> Segments<D> {
        Segments {
            child,
            warnings,
            ..self.clone()
        }
    }

    fn resolve(&self, address: &Linear) -> Result<Target, Error> {
        let bases = address
            .vars()
            .filter_map(|var| self.symbolic.get(var).map(|memvar| (var, memvar)))
            .collect::<Vec<(&NumVar, &MemVar)>>();
        match bases.as_slice() {
            [(base, memvar)] => Ok(Target::Region {
                region: self.region(memvar)?.clone(),
                pointer: AbstractPointer::relative_to(address, base),
                origin: Linear::zero(),
            }),
            [] => {
                let range = self.child.query_range(address)?;
                let span = match FiniteRange::from_range(&range) {
                    Some(span) => span,
                    None => return Ok(Target::Imprecise),
                };
                let overlapping = self.absolute.search_overlaps(&span);
                match overlapping.as_slice() {
                    [] => Ok(Target::Unknown),
                    [(region_span, memvar)] => Ok(Target::Region {
                        region: self.region(memvar)?.clone(),
                        pointer: AbstractPointer::absolute(address.clone()),
                        origin: Linear::constant(region_span.low().clone()),
                    }),
                    _ => Ok(Target::Imprecise),
                }
            }
            _ => Ok(Target::Imprecise),
        }
    }

    /// Restrict `self.child` to the executions where the access stays inside
    /// `region`, recording a warning for each way it may leave it.
    ///
    /// If the access always leaves the region, the state is kept as it is.
    fn check_bounds(
        &self,
        region: &Region,
        pointer: &AbstractPointer,
        origin: &Linear,
        size: u64,
        warnings: &mut WarningsContainer,
    ) -> Result<D, Error> {
        let lower = origin.clone();
        let upper =
            origin.add_constant(BigInt::from(region.size) - BigInt::from(size) + BigInt::from(1));
        let below = feasible(pointer.calc_below_access(&self.child, &lower))?.is_some();
        let above = feasible(pointer.calc_above_access(&self.child, &upper))?.is_some();
        if !below && !above {
            return Ok(self.child.clone());
        }

        let inside = feasible(pointer.calc_inside_access(&self.child, &lower, &upper))?;
        let report = |kind: WarningKind, message: String| match &inside {
            Some(_) => WarningMessage::state_restriction(kind, message),
            None => WarningMessage::warning(kind, message),
        };
        if below {
            let message = format!(
                "{}-byte access at {} may start before {}",
                size, pointer, region.memvar
            );
            debug!("{}", message);
            warnings.add(report(WarningKind::OutOfRegionBelow, message));
        }
        if above {
            let message = format!(
                "{}-byte access at {} may end past the {} bytes of {}",
                size, pointer, region.size, region.memvar
            );
            debug!("{}", message);
            warnings.add(report(WarningKind::OutOfRegionAbove, message));
        }
        Ok(inside.unwrap_or_else(|| self.child.clone()))
    }

    fn warn_unresolved(target: &Target, address: &Linear, warnings: &mut WarningsContainer) {
        let (kind, message) = match target {
            Target::Unknown => (
                WarningKind::UnknownRegion,
                format!("{} does not point into a known region", address),
            ),
            _ => (
                WarningKind::ImpreciseAccess,
                format!("{} may point into more than one region", address),
            ),
        };
        debug!("{}", message);
        warnings.add(WarningMessage::warning(kind, message));
    }

    fn load(&self, dst: &NumVar, size: u64, address: &Linear) -> Result<Segments<D>, Error> {
        let mut warnings = WarningsContainer::new();
        let target = self.resolve(address)?;
        let (child, value) = match &target {
            Target::Region {
                region,
                pointer,
                origin,
            } => {
                let child = self.check_bounds(region, pointer, origin, size, &mut warnings)?;
                let access = pointer.in_region(region.memvar.clone(), origin);
                let offset = access.offset().range(&child)?;
                let field = offset
                    .is_constant()
                    .and_then(|offset| FiniteRange::span(offset.clone(), size))
                    .and_then(|span| self.fields.get(&region.memvar)?.get(&span).cloned());
                let value = match field {
                    Some(field) => Rhs::Linear(Linear::var(&field)),
                    None => Rhs::Range(Range::top()),
                };
                (child, value)
            }
            Target::Unknown | Target::Imprecise => {
                Segments::<D>::warn_unresolved(&target, address, &mut warnings);
                (self.child.clone(), Rhs::Range(Range::top()))
            }
        };
        let child = child.eval(&Instruction::Assign {
            dst: dst.clone(),
            src: value,
        })?;
        Ok(self.with_child(child, warnings))
    }

    fn store(&self, address: &Linear, size: u64, src: &Linear) -> Result<Segments<D>, Error> {
        let mut warnings = WarningsContainer::new();
        let target = self.resolve(address)?;
        let (region, pointer, origin) = match &target {
            Target::Region {
                region,
                pointer,
                origin,
            } => (region, pointer, origin),
            Target::Unknown | Target::Imprecise => {
                Segments::<D>::warn_unresolved(&target, address, &mut warnings);
                let mut state = self.with_child(self.child.clone(), warnings);
                for memvar in self.fields.keys() {
                    state = state.kill_fields(memvar, None)?;
                }
                return Ok(state);
            }
        };

        if !region.permissions.contains(RegionPermissions::WRITE) {
            let message = format!("write to read-only region {}", region.memvar);
            debug!("{}", message);
            warnings.add(WarningMessage::warning(
                WarningKind::WriteToReadOnlyRegion,
                message,
            ));
        }
        let child = self.check_bounds(region, pointer, origin, size, &mut warnings)?;
        let access = pointer.in_region(region.memvar.clone(), origin);
        let offset = access.offset().range(&child)?;
        let state = self.with_child(child, warnings);

        let start = match offset.is_constant() {
            Some(start) => start.clone(),
            None => {
                // Any field the access may touch is lost.
                let span = FiniteRange::from_range(&offset).and_then(|span| {
                    FiniteRange::new(
                        span.low().clone(),
                        span.high() + BigInt::from(size) - BigInt::from(1),
                    )
                });
                return state.kill_fields(&region.memvar, span.as_ref());
            }
        };
        let span = FiniteRange::span(start.clone(), size)
            .ok_or_else(|| Error::invariant("store of zero bytes"))?;
        let field = NumVar::fresh(format!("{}[{}]", region.memvar, start));
        let mut state = state.kill_fields(&region.memvar, Some(&span))?;
        state.child = state.child.eval(&Instruction::assign(field.clone(), src.clone()))?;
        let tree = state.fields_of(&region.memvar).insert(span, field);
        state.fields = state.fields.insert(region.memvar.clone(), tree);
        Ok(state)
    }

    fn fields_of(&self, memvar: &MemVar) -> RangeTree<NumVar> {
        self.fields.get(memvar).cloned().unwrap_or_default()
    }

    /// Forget the fields of `memvar` overlapping `span`, or all of them.
    fn kill_fields(
        &self,
        memvar: &MemVar,
        span: Option<&FiniteRange>,
    ) -> Result<Segments<D>, Error> {
        let tree = self.fields_of(memvar);
        let killed = match span {
            Some(span) => tree.search_overlaps(span),
            None => tree
                .iter()
                .map(|(span, var)| (span.clone(), var.clone()))
                .collect(),
        };
        if killed.is_empty() {
            return Ok(self.clone());
        }
        let mut child = self.child.clone();
        let mut tree = tree;
        for (span, var) in killed {
            child = child.project(&var)?;
            tree = tree.remove(&span);
        }
        Ok(Segments {
            child,
            fields: self.fields.insert(memvar.clone(), tree),
            ..self.clone()
        })
    }

    /// This state with the regions of `other` it does not know yet.
    fn with_regions_of(&self, other: &Segments<D>) -> Segments<D> {
        let mut state = self.clone();
        for region in other.regions.values() {
            if state.regions.contains_key(region.memvar.stamp()) {
                continue;
            }
            state.regions = state.regions.insert(region.memvar.stamp(), region.clone());
            state.fields = state.fields.insert(region.memvar.clone(), RangeTree::new());
            match &region.base {
                RegionBase::Absolute(address) => {
                    if let Some(span) = FiniteRange::span(address.clone(), region.size) {
                        state.absolute = state.absolute.insert(span, region.memvar.clone());
                    }
                }
                RegionBase::Symbolic(base) => {
                    state.symbolic = state.symbolic.insert(base.clone(), region.memvar.clone());
                }
            }
        }
        state
    }

    /// Bring two states to the same fields. A field both states hold under
    /// different variables is renamed in `other`'s child. A field only one
    /// state holds is forgotten.
    fn make_compatible(&self, other: &Segments<D>) -> Result<(Segments<D>, Segments<D>), Error> {
        let mut this = self.with_regions_of(other);
        let mut that = other.with_regions_of(self);
        let memvars = this.fields.keys().cloned().collect::<Vec<MemVar>>();
        for memvar in memvars {
            let ours = this.fields_of(&memvar);
            let theirs = that.fields_of(&memvar);
            let mut kept = RangeTree::new();
            for (span, var) in ours.iter() {
                match theirs.get(span) {
                    Some(their_var) => {
                        if their_var != var {
                            that.child = that.child.substitute(their_var, var)?;
                        }
                        kept = kept.insert(span.clone(), var.clone());
                    }
                    None => this.child = this.child.project(var)?,
                }
            }
            for (span, var) in theirs.iter() {
                if ours.get(span).is_none() {
                    that.child = that.child.project(var)?;
                }
            }
            this.fields = this.fields.insert(memvar.clone(), kept.clone());
            that.fields = that.fields.insert(memvar, kept);
        }
        Ok((this, that))
    }

    fn combine<F>(&self, other: &Segments<D>, f: F) -> Result<Segments<D>, Error>
    where
        F: Fn(&D, &D) -> Result<D, Error>,
    {
        let (this, that) = self.make_compatible(other)?;
        let child = f(&this.child, &that.child)?;
        Ok(this.with_child(child, WarningsContainer::new()))
    }
}

impl<D: Domain> QueryChannel for Segments<D> {
    fn query_range(&self, expr: &Linear) -> Result<Range, Error> {
        self.child.query_range(expr)
    }
}

impl<D: Domain> Domain for Segments<D> {
    fn eval(&self, instruction: &Instruction) -> Result<Segments<D>, Error> {
        match instruction {
            Instruction::Load { dst, size, address } => self.load(dst, *size, address),
            Instruction::Store { address, size, src } => self.store(address, *size, src),
            Instruction::Assign { .. } | Instruction::Test(_) | Instruction::Nop => {
                let child = self.child.eval(instruction)?;
                Ok(self.with_child(child, WarningsContainer::new()))
            }
        }
    }

    fn join(&self, other: &Segments<D>) -> Result<Segments<D>, Error> {
        self.combine(other, |a, b| a.join(b))
    }

    fn widen(&self, other: &Segments<D>) -> Result<Segments<D>, Error> {
        self.combine(other, |a, b| a.widen(b))
    }

    fn subsumes(&self, other: &Segments<D>) -> Result<bool, Error> {
        let mut that = other.with_regions_of(self);
        for (memvar, ours) in self.fields.iter() {
            let theirs = that.fields_of(memvar);
            for (span, var) in ours.iter() {
                match theirs.get(span) {
                    Some(their_var) if their_var == var => {}
                    Some(their_var) => that.child = that.child.substitute(their_var, var)?,
                    // `other` does not know this field, it may hold anything.
                    None => return Ok(false),
                }
            }
            for (span, var) in theirs.iter() {
                if ours.get(span).is_none() {
                    that.child = that.child.project(var)?;
                }
            }
        }
        self.child.subsumes(&that.child)
    }

    fn introduce(&self, var: &NumVar, value: &Range) -> Result<Segments<D>, Error> {
        let child = self.child.introduce(var, value)?;
        Ok(self.with_child(child, WarningsContainer::new()))
    }

    fn project(&self, var: &NumVar) -> Result<Segments<D>, Error> {
        let mut state = self.with_child(self.child.project(var)?, WarningsContainer::new());
        for (memvar, tree) in self.fields.iter() {
            let spans = tree
                .iter()
                .filter(|(_, field)| *field == var)
                .map(|(span, _)| span.clone())
                .collect::<Vec<FiniteRange>>();
            for span in spans {
                let tree = state.fields_of(memvar).remove(&span);
                state.fields = state.fields.insert(memvar.clone(), tree);
            }
        }
        Ok(state)
    }

    fn substitute(&self, from: &NumVar, to: &NumVar) -> Result<Segments<D>, Error> {
        let child = self.child.substitute(from, to)?;
        let mut state = self.with_child(child, WarningsContainer::new());
        for (memvar, tree) in self.fields.iter() {
            for (span, field) in tree.iter() {
                if field == from {
                    let tree = state.fields_of(memvar).insert(span.clone(), to.clone());
                    state.fields = state.fields.insert(memvar.clone(), tree);
                }
            }
        }
        if let Some(memvar) = self.symbolic.get(from) {
            let region = self.region(memvar)?;
            let region = Region {
                base: RegionBase::Symbolic(to.clone()),
                ..region.clone()
            };
            state.symbolic = state.symbolic.remove(from).insert(to.clone(), memvar.clone());
            state.regions = state.regions.insert(memvar.stamp(), region);
        }
        Ok(state)
    }

    fn warnings(&self) -> WarningsContainer {
        self.warnings.clone()
    }
}

impl<D: Domain> fmt::Display for Segments<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for region in self.regions.values() {
            writeln!(f, "{}", region)?;
        }
        for (memvar, tree) in self.fields.iter() {
            for (span, field) in tree.iter() {
                writeln!(f, "{}{} = {}", memvar, span, field)?;
            }
        }
        write!(f, "{}", self.child)
    }
}
