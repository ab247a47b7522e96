//! Operand stack depth flow analysis
//!
//! A depth-first walk over the instruction arena propagating the per-node stack deltas recorded
//! at emission time. Every node must be reached at one consistent depth; exception handler entry
//! points start at depth 1 (the thrown reference). Subroutine calls are special-cased: the body
//! is walked once from its first call site, its net depth effect is cached, and later `jsr`s just
//! apply the cached offset at their return points.

use crate::code::insn::{Insn, LocalInsn};
use crate::code::{Code, Label};
use crate::errors::{Error, Result};
use crate::util::Width;
use std::collections::{HashMap, HashSet};

pub(crate) fn max_stack(code: &Code) -> Result<u16> {
    let mut analysis = Analysis {
        code,
        depths: vec![None; code.insns.len()],
        max: 0,
        sub_deltas: HashMap::new(),
        in_progress: HashSet::new(),
    };
    analysis.walk(0, 0, &mut None)?;
    let handler_seeds: Vec<usize> = code
        .handlers
        .iter()
        .map(|spec| code.node_of(spec.handler))
        .collect();
    for seed in handler_seeds {
        // The handler receives exactly the thrown reference
        analysis.walk(seed, 1, &mut None)?;
    }
    Ok(analysis.max)
}

/// State of one subroutine body walk, shared by every path inside that body
struct SubWalk {
    entry: Label,
    entry_depth: u16,
    delta: Option<i32>,
}

struct Analysis<'a> {
    code: &'a Code,
    depths: Vec<Option<u16>>,
    max: u16,

    /// Net depth effect per subroutine entry label (`None` when the body never `ret`s)
    sub_deltas: HashMap<u32, Option<i32>>,
    in_progress: HashSet<u32>,
}

impl<'a> Analysis<'a> {
    fn walk(&mut self, start: usize, start_depth: u16, sub: &mut Option<SubWalk>) -> Result<()> {
        let code = self.code;
        let mut worklist: Vec<(usize, u16)> = vec![(start, start_depth)];

        while let Some((mut at, mut depth)) = worklist.pop() {
            loop {
                if at >= code.insns.len() {
                    return Err(Error::CodeFallsOffEnd);
                }
                match self.depths[at] {
                    Some(existing) if existing == depth => break,
                    Some(existing) => {
                        log::error!(
                            "Instruction {} reached at stack depth {} and {}",
                            at,
                            existing,
                            depth
                        );
                        return Err(Error::InconsistentStackDepth {
                            at,
                            expected: existing,
                            found: depth,
                        });
                    }
                    None => {
                        self.depths[at] = Some(depth);
                        self.max = self.max.max(depth);
                    }
                }

                match &code.insns[at] {
                    Insn::Mark(_) => (),
                    Insn::Plain {
                        stack, terminal, ..
                    } => {
                        depth = self.apply(at, depth, *stack as i32)?;
                        if *terminal {
                            break;
                        }
                    }
                    Insn::PoolRef { stack, .. } => {
                        depth = self.apply(at, depth, *stack as i32)?;
                    }
                    Insn::LoadConst { two_slots, .. } => {
                        depth = self.apply(at, depth, if *two_slots { 2 } else { 1 })?;
                    }
                    Insn::Local { insn, .. } => {
                        let delta = match insn {
                            LocalInsn::Load(kind) => kind.width() as i32,
                            LocalInsn::Store(kind) => -(kind.width() as i32),
                            LocalInsn::Iinc(_) => 0,
                        };
                        depth = self.apply(at, depth, delta)?;
                    }
                    Insn::Branch { kind, target } => {
                        depth = self.apply(at, depth, -(kind.pops() as i32))?;
                        worklist.push((code.node_of(*target), depth));
                        if !kind.falls_through() {
                            break;
                        }
                    }
                    Insn::Switch { default, cases, .. } => {
                        depth = self.apply(at, depth, -1)?;
                        worklist.push((code.node_of(*default), depth));
                        for (_, target) in cases {
                            worklist.push((code.node_of(*target), depth));
                        }
                        break;
                    }
                    Insn::Jsr { target } => {
                        let entry_depth = self.apply(at, depth, 1)?;
                        match self.subroutine_delta(*target, entry_depth)? {
                            // Execution resumes after the call at whatever depth the body left
                            Some(delta) => depth = self.apply(at, depth, 1 + delta)?,
                            // The body never rets, so the return point is unreachable
                            None => break,
                        }
                    }
                    Insn::Ret { .. } => match sub {
                        Some(walk) => {
                            let delta = depth as i32 - walk.entry_depth as i32;
                            match walk.delta {
                                None => walk.delta = Some(delta),
                                Some(existing) if existing == delta => (),
                                Some(_) => {
                                    return Err(Error::InconsistentSubroutine { entry: walk.entry })
                                }
                            }
                            break;
                        }
                        None => return Err(Error::RetOutsideSubroutine { at }),
                    },
                }

                at += 1;
            }
        }
        Ok(())
    }

    /// Net depth effect of the subroutine starting at `entry`, walking its body on first use
    fn subroutine_delta(&mut self, entry: Label, entry_depth: u16) -> Result<Option<i32>> {
        if let Some(delta) = self.sub_deltas.get(&entry.0) {
            return Ok(*delta);
        }
        if !self.in_progress.insert(entry.0) {
            // A subroutine (transitively) calling itself never has a consistent effect
            return Err(Error::InconsistentSubroutine { entry });
        }
        let start = self.code.node_of(entry);
        let mut walk = Some(SubWalk {
            entry,
            entry_depth,
            delta: None,
        });
        self.walk(start, entry_depth, &mut walk)?;
        self.in_progress.remove(&entry.0);

        let delta = walk.and_then(|walk| walk.delta);
        self.sub_deltas.insert(entry.0, delta);
        Ok(delta)
    }

    fn apply(&mut self, at: usize, depth: u16, delta: i32) -> Result<u16> {
        let new_depth = depth as i32 + delta;
        if new_depth < 0 {
            return Err(Error::StackUnderflow { at });
        }
        if new_depth > u16::MAX as i32 {
            return Err(Error::MethodStackOverflow {
                at,
                depth: new_depth,
            });
        }
        self.max = self.max.max(new_depth as u16);
        Ok(new_depth as u16)
    }
}
