//! Byte layout as a fixed point
//!
//! Instruction widths depend on byte offsets (switch padding, branch distances) and byte offsets
//! depend on widths, so sizing iterates: a forward pass assigns offsets from current widths, then
//! every still-narrow jump whose distance fell outside the 16-bit range is widened. Widening is
//! one-way, so the iteration terminates. A widened conditional jump becomes the inverted
//! condition skipping over a `goto_w`.

use crate::code::insn::{op, Insn, LocalInsn, PoolRefTail};
use crate::code::{Code, Label};
use crate::errors::{Error, Result};
use crate::pool::ConstantPool;
use crate::util::Width;
use byteorder::{BigEndian, WriteBytesExt};

pub(crate) struct Layout {
    /// Byte offset of every arena node (marker nodes share the offset of what follows them)
    pub offsets: Vec<u32>,
    pub wide: Vec<bool>,
    pub total: u32,
}

pub(crate) fn layout(code: &Code, pool: &ConstantPool, slots: &[u16]) -> Result<Layout> {
    let n = code.insns.len();
    let mut offsets = vec![0u32; n];
    let mut wide = vec![false; n];

    loop {
        let mut off: u32 = 0;
        for at in 0..n {
            offsets[at] = off;
            off += insn_width(code, at, off, wide[at], pool, slots)? as u32;
        }

        let mut changed = false;
        for at in 0..n {
            if wide[at] {
                continue;
            }
            let target = match &code.insns[at] {
                Insn::Branch { target, .. } => *target,
                Insn::Jsr { target } => *target,
                _ => continue,
            };
            let distance = offsets[code.node_of(target)] as i64 - offsets[at] as i64;
            if distance < i16::MIN as i64 || distance > i16::MAX as i64 {
                log::trace!("widening jump at node {} (distance {})", at, distance);
                wide[at] = true;
                changed = true;
            }
        }

        if !changed {
            if off > u16::MAX as u32 {
                return Err(Error::MethodCodeOverflow(off as usize));
            }
            return Ok(Layout {
                offsets,
                wide,
                total: off,
            });
        }
    }
}

/// Padding between a switch opcode at `off` and its 4-byte-aligned operands
fn switch_padding(off: u32) -> u32 {
    (4 - ((off + 1) % 4)) % 4
}

fn insn_width(
    code: &Code,
    at: usize,
    off: u32,
    wide: bool,
    pool: &ConstantPool,
    slots: &[u16],
) -> Result<usize> {
    Ok(match &code.insns[at] {
        Insn::Plain { bytes, .. } => bytes.width(),
        Insn::PoolRef { tail, .. } => 3 + tail.len(),
        Insn::LoadConst {
            constant,
            two_slots,
        } => {
            if *two_slots || pool.index_of(*constant)? > u8::MAX as u16 {
                3
            } else {
                2
            }
        }
        Insn::Mark(_) => 0,
        Insn::Branch { kind, .. } => {
            if !wide {
                3
            } else if kind.negate().is_some() {
                8
            } else {
                5
            }
        }
        Insn::Jsr { .. } => {
            if wide {
                5
            } else {
                3
            }
        }
        Insn::Ret { var } => {
            if slots[var.0 as usize] > u8::MAX as u16 {
                4
            } else {
                2
            }
        }
        Insn::Switch { cases, dense, .. } => {
            let pad = switch_padding(off) as usize;
            if *dense {
                let range =
                    cases[cases.len() - 1].0 as i64 - cases[0].0 as i64 + 1;
                1 + pad + 12 + 4 * range as usize
            } else {
                1 + pad + 8 + 8 * cases.len()
            }
        }
        Insn::Local { insn, var } => {
            let slot = slots[var.0 as usize];
            match insn {
                LocalInsn::Load(_) | LocalInsn::Store(_) => {
                    if slot <= 3 {
                        1
                    } else if slot <= u8::MAX as u16 {
                        2
                    } else {
                        4
                    }
                }
                LocalInsn::Iinc(amount) => {
                    if slot <= u8::MAX as u16 && i8::try_from(*amount).is_ok() {
                        3
                    } else {
                        6
                    }
                }
            }
        }
    })
}

pub(crate) fn emit(
    code: &Code,
    layout: &Layout,
    pool: &ConstantPool,
    slots: &[u16],
) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(layout.total as usize);
    let target_off = |label: Label| layout.offsets[code.node_of(label)];

    for (at, insn) in code.insns.iter().enumerate() {
        let off = layout.offsets[at];
        debug_assert_eq!(out.len() as u32, off);

        match insn {
            Insn::Plain { bytes, .. } => out.extend_from_slice(bytes.as_bytes()),
            Insn::PoolRef {
                opcode,
                constant,
                tail,
                ..
            } => {
                out.write_u8(*opcode)?;
                out.write_u16::<BigEndian>(pool.index_of(*constant)?)?;
                match tail {
                    PoolRefTail::None => (),
                    PoolRefTail::InterfaceCount(count) => {
                        out.write_u8(*count)?;
                        out.write_u8(0)?;
                    }
                    PoolRefTail::Dimensions(dims) => out.write_u8(*dims)?,
                }
            }
            Insn::LoadConst {
                constant,
                two_slots,
            } => {
                let index = pool.index_of(*constant)?;
                if *two_slots {
                    out.write_u8(op::LDC2_W)?;
                    out.write_u16::<BigEndian>(index)?;
                } else if index <= u8::MAX as u16 {
                    out.write_u8(op::LDC)?;
                    out.write_u8(index as u8)?;
                } else {
                    out.write_u8(op::LDC_W)?;
                    out.write_u16::<BigEndian>(index)?;
                }
            }
            Insn::Mark(_) => (),
            Insn::Branch { kind, target } => {
                let distance = target_off(*target) as i64 - off as i64;
                if !layout.wide[at] {
                    out.write_u8(kind.opcode())?;
                    out.write_i16::<BigEndian>(distance as i16)?;
                } else if let Some(negated) = kind.negate() {
                    // Inverted condition skipping over a wide unconditional jump
                    out.write_u8(negated.opcode())?;
                    out.write_i16::<BigEndian>(8)?;
                    out.write_u8(op::GOTO_W)?;
                    let wide_distance = target_off(*target) as i64 - (off as i64 + 3);
                    out.write_i32::<BigEndian>(wide_distance as i32)?;
                } else {
                    out.write_u8(op::GOTO_W)?;
                    out.write_i32::<BigEndian>(distance as i32)?;
                }
            }
            Insn::Jsr { target } => {
                let distance = target_off(*target) as i64 - off as i64;
                if layout.wide[at] {
                    out.write_u8(op::JSR_W)?;
                    out.write_i32::<BigEndian>(distance as i32)?;
                } else {
                    out.write_u8(op::JSR)?;
                    out.write_i16::<BigEndian>(distance as i16)?;
                }
            }
            Insn::Ret { var } => {
                let slot = slots[var.0 as usize];
                if slot <= u8::MAX as u16 {
                    out.write_u8(op::RET)?;
                    out.write_u8(slot as u8)?;
                } else {
                    out.write_u8(op::WIDE)?;
                    out.write_u8(op::RET)?;
                    out.write_u16::<BigEndian>(slot)?;
                }
            }
            Insn::Switch {
                default,
                cases,
                dense,
            } => {
                let opcode = if *dense {
                    op::TABLESWITCH
                } else {
                    op::LOOKUPSWITCH
                };
                out.write_u8(opcode)?;
                for _ in 0..switch_padding(off) {
                    out.write_u8(0)?;
                }
                let default_distance = (target_off(*default) as i64 - off as i64) as i32;
                out.write_i32::<BigEndian>(default_distance)?;

                if *dense {
                    let low = cases[0].0;
                    let high = cases[cases.len() - 1].0;
                    out.write_i32::<BigEndian>(low)?;
                    out.write_i32::<BigEndian>(high)?;
                    let mut next_case = 0;
                    for value in low as i64..=high as i64 {
                        let distance = if next_case < cases.len()
                            && cases[next_case].0 as i64 == value
                        {
                            let label = cases[next_case].1;
                            next_case += 1;
                            (target_off(label) as i64 - off as i64) as i32
                        } else {
                            default_distance
                        };
                        out.write_i32::<BigEndian>(distance)?;
                    }
                } else {
                    out.write_i32::<BigEndian>(cases.len() as i32)?;
                    for (value, label) in cases {
                        out.write_i32::<BigEndian>(*value)?;
                        out.write_i32::<BigEndian>(
                            (target_off(*label) as i64 - off as i64) as i32,
                        )?;
                    }
                }
            }
            Insn::Local { insn, var } => {
                let slot = slots[var.0 as usize];
                match insn {
                    LocalInsn::Load(kind) => {
                        emit_load_or_store(&mut out, op::ILOAD, op::ILOAD_0, kind.family_index(), slot)?
                    }
                    LocalInsn::Store(kind) => {
                        emit_load_or_store(&mut out, op::ISTORE, op::ISTORE_0, kind.family_index(), slot)?
                    }
                    LocalInsn::Iinc(amount) => {
                        if slot <= u8::MAX as u16 && i8::try_from(*amount).is_ok() {
                            out.write_u8(op::IINC)?;
                            out.write_u8(slot as u8)?;
                            out.write_i8(*amount as i8)?;
                        } else {
                            out.write_u8(op::WIDE)?;
                            out.write_u8(op::IINC)?;
                            out.write_u16::<BigEndian>(slot)?;
                            out.write_i16::<BigEndian>(*amount)?;
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Short form for slots 0-3, one-byte operand through 255, `wide` beyond
fn emit_load_or_store(
    out: &mut Vec<u8>,
    base: u8,
    base_short: u8,
    family: u8,
    slot: u16,
) -> Result<()> {
    if slot <= 3 {
        out.write_u8(base_short + family * 4 + slot as u8)?;
    } else if slot <= u8::MAX as u16 {
        out.write_u8(base + family)?;
        out.write_u8(slot as u8)?;
    } else {
        out.write_u8(op::WIDE)?;
        out.write_u8(base + family)?;
        out.write_u16::<BigEndian>(slot)?;
    }
    Ok(())
}
