//! Parses the minimal textual uop-trace format this binary replays through a
//! `ScriptedFrontend`, standing in for the out-of-scope Functional Frontend
//! (SPEC_FULL.md §6/§9).
//!
//! One line per macro-instruction step:
//!
//! ```text
//! <opcode> <flags,comma,separated> <mop_size> [out=r1,r2] [in=r3,r4] [target=0x1008]
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. `target=` only
//! applies to control uops and overrides `pred_neip`/`target_neip`/`neip`
//! (straight-line fallthrough otherwise).

use uarchsim_core::frontend::scripted::ScriptedStep;
use uarchsim_core::uop::{
    logical, LogicalReg, MemoryInfo, Membership, PredictorMeta, RenameInfo, Uop, UopFlags,
    UopStatus, UopTimestamps,
};

/// A malformed trace line, reported with its 1-based line number.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace line {line}: expected at least `<opcode> <flags> <mop_size>`, got {text:?}")]
    TooFewFields { line: usize, text: String },
    #[error("trace line {line}: invalid opcode {value:?}")]
    InvalidOpcode { line: usize, value: String },
    #[error("trace line {line}: invalid mop_size {value:?}")]
    InvalidMopSize { line: usize, value: String },
    #[error("trace line {line}: unknown flag {name:?}")]
    UnknownFlag { line: usize, name: String },
    #[error("trace line {line}: unknown register {name:?}")]
    UnknownRegister { line: usize, name: String },
    #[error("trace line {line}: invalid target {value:?}")]
    InvalidTarget { line: usize, value: String },
}

fn parse_flags(line: usize, spec: &str) -> Result<UopFlags, TraceError> {
    let mut flags = UopFlags::empty();
    for name in spec.split(',') {
        flags |= match name {
            "INT" => UopFlags::INT,
            "LOGIC" => UopFlags::LOGIC,
            "FP" => UopFlags::FP,
            "MEM" => UopFlags::MEM,
            "XMM" => UopFlags::XMM,
            "CTRL" => UopFlags::CTRL,
            "COND" => UopFlags::COND,
            "UNCOND" => UopFlags::UNCOND,
            "INDEX" => UopFlags::INDEX,
            "PREFETCH" => UopFlags::PREFETCH,
            "STORE" => UopFlags::STORE,
            "CALL" => UopFlags::CALL,
            "RETURN" => UopFlags::RETURN,
            other => {
                return Err(TraceError::UnknownFlag {
                    line,
                    name: other.to_owned(),
                })
            }
        };
    }
    Ok(flags)
}

fn parse_reg(line: usize, name: &str) -> Result<LogicalReg, TraceError> {
    match name {
        "ea" => Ok(logical::EA),
        "data" => Ok(logical::DATA),
        "aux" => Ok(logical::AUX),
        _ => {
            let idx = name
                .strip_prefix('r')
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|&n| n < logical::GPR_COUNT)
                .ok_or_else(|| TraceError::UnknownRegister {
                    line,
                    name: name.to_owned(),
                })?;
            Ok(logical::gpr(idx))
        }
    }
}

fn parse_reg_list(line: usize, list: &str) -> Result<Vec<LogicalReg>, TraceError> {
    list.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| parse_reg(line, s))
        .collect()
}

/// Parses `source` into the step sequence a `ScriptedFrontend` replays.
pub fn parse(source: &str) -> Result<Vec<ScriptedStep>, TraceError> {
    let mut steps = Vec::new();
    let mut eip = 0u64;

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(TraceError::TooFewFields {
                line,
                text: text.to_owned(),
            });
        }

        let opcode: u32 = fields[0].parse().map_err(|_| TraceError::InvalidOpcode {
            line,
            value: fields[0].to_owned(),
        })?;
        let flags = parse_flags(line, fields[1])?;
        let mop_size: u64 = fields[2].parse().map_err(|_| TraceError::InvalidMopSize {
            line,
            value: fields[2].to_owned(),
        })?;

        let mut logical_outputs = Vec::new();
        let mut logical_inputs = Vec::new();
        let mut target: Option<u64> = None;
        for field in &fields[3..] {
            if let Some(rest) = field.strip_prefix("out=") {
                logical_outputs = parse_reg_list(line, rest)?;
            } else if let Some(rest) = field.strip_prefix("in=") {
                logical_inputs = parse_reg_list(line, rest)?;
            } else if let Some(rest) = field.strip_prefix("target=") {
                let value = rest.strip_prefix("0x").unwrap_or(rest);
                target = Some(u64::from_str_radix(value, 16).map_err(|_| {
                    TraceError::InvalidTarget {
                        line,
                        value: rest.to_owned(),
                    }
                })?);
            }
        }

        let fallthrough = eip + mop_size;
        let next = target.unwrap_or(fallthrough);
        let uop = Uop {
            opcode,
            flags,
            ctx: uarchsim_core::common::ContextId(0),
            seq: uarchsim_core::common::Seq(0),
            di_seq: None,
            eip,
            pred_neip: next,
            target_neip: next,
            neip: next,
            mop_size,
            specmode: false,
            membership: Membership::default(),
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo {
                logical_inputs,
                logical_outputs,
                ..RenameInfo::default()
            },
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };

        steps.push(ScriptedStep {
            uops: vec![uop],
            mop_size,
        });
        eip = fallthrough;
    }

    Ok(steps)
}
