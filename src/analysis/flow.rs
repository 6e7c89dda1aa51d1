//! Flow chart construction for a single function.
//!
//! Used by hosts that can decode instructions but do not ship their own
//! control-flow analysis. The function body is swept linearly between its
//! start and end, block leaders are taken from branch targets and from the
//! instructions following a control transfer, and each block is classified by
//! how it exits.

use std::collections::BTreeSet;

use crate::core::basic_block::{BasicBlock, BlockKind};
use crate::core::control_flow_graph::FlowChart;
use crate::core::instruction::{Instruction, OperandKind};

/// How an instruction transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    /// Execution continues with the next instruction
    Sequential,
    /// Call; execution resumes after it
    Call,
    /// Jump; `conditional` jumps also fall through
    Jump { target: Option<u64>, conditional: bool },
    /// Return to the caller
    Return,
    /// Trap or halt; control never continues
    Stop,
}

/// Classify an instruction by mnemonic (x86 and AArch64 spellings).
pub fn classify(ins: &Instruction) -> ControlFlow {
    let m = ins.mnemonic.as_str();
    let target = ins
        .operands
        .iter()
        .find(|op| matches!(op.kind, OperandKind::NearCode | OperandKind::FarCode))
        .map(|op| op.value);
    match m {
        "ret" | "retq" | "retn" | "retf" | "iret" | "iretq" => ControlFlow::Return,
        "call" | "callq" | "bl" | "blr" => ControlFlow::Call,
        "jmp" | "jmpq" | "b" | "br" => ControlFlow::Jump {
            target,
            conditional: false,
        },
        "hlt" | "ud2" | "int3" | "brk" => ControlFlow::Stop,
        "cbz" | "cbnz" | "tbz" | "tbnz" => ControlFlow::Jump {
            target,
            conditional: true,
        },
        _ if m.starts_with("b.") => ControlFlow::Jump {
            target,
            conditional: true,
        },
        _ if m.starts_with('j') || m.starts_with("loop") => ControlFlow::Jump {
            target,
            conditional: true,
        },
        _ => ControlFlow::Sequential,
    }
}

/// Build the flow chart of the function occupying `[start, end)`.
///
/// Decoding stops at the first address `decode` cannot handle.
pub fn build_flow_chart<F>(decode: F, start: u64, end: u64) -> FlowChart
where
    F: Fn(u64) -> Option<Instruction>,
{
    let mut insns: Vec<Instruction> = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let Some(ins) = decode(cursor) else { break };
        if ins.length == 0 {
            break;
        }
        cursor = ins.end_address();
        insns.push(ins);
    }
    let body_end = cursor.min(end);
    let in_body = |a: u64| a >= start && a < body_end;

    let mut leaders: BTreeSet<u64> = BTreeSet::new();
    leaders.insert(start);
    for ins in &insns {
        match classify(ins) {
            ControlFlow::Jump { target, .. } => {
                if let Some(t) = target.filter(|&t| in_body(t)) {
                    leaders.insert(t);
                }
                leaders.insert(ins.end_address());
            }
            ControlFlow::Return | ControlFlow::Stop => {
                leaders.insert(ins.end_address());
            }
            ControlFlow::Call | ControlFlow::Sequential => {}
        }
    }
    // Leaders must fall on instruction boundaries.
    let boundaries: BTreeSet<u64> = insns.iter().map(|i| i.address).collect();
    leaders.retain(|a| boundaries.contains(a));

    let mut blocks = Vec::new();
    let mut block_start: Option<u64> = None;
    for (idx, ins) in insns.iter().enumerate() {
        let bstart = *block_start.get_or_insert(ins.address);
        let next = ins.end_address();
        let is_last = idx + 1 == insns.len();
        if !(is_last || leaders.contains(&next)) {
            continue;
        }
        let (kind, successors) = match classify(ins) {
            ControlFlow::Return => (BlockKind::Return, Vec::new()),
            ControlFlow::Stop => (BlockKind::NoReturn, Vec::new()),
            ControlFlow::Jump {
                target,
                conditional,
            } => {
                let mut succ: Vec<u64> = target.filter(|&t| in_body(t)).into_iter().collect();
                if conditional && in_body(next) {
                    succ.push(next);
                }
                (BlockKind::Normal, succ)
            }
            ControlFlow::Call | ControlFlow::Sequential => {
                let succ = if in_body(next) { vec![next] } else { Vec::new() };
                (BlockKind::Normal, succ)
            }
        };
        blocks.push(BasicBlock::new(bstart, next, kind).with_successors(successors));
        block_start = None;
    }

    FlowChart::new(start, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instruction::Operand;
    use std::collections::BTreeMap;

    fn listing(insns: Vec<Instruction>) -> BTreeMap<u64, Instruction> {
        insns.into_iter().map(|i| (i.address, i)).collect()
    }

    #[test]
    fn splits_on_conditional_branch() {
        // 0x10: test ; 0x12: je 0x20 ; 0x14: mov ; 0x1f: ret ; 0x20: mov ; 0x25: ret
        let code = listing(vec![
            Instruction::new(0x10, 2, "test", vec![]),
            Instruction::new(0x12, 2, "je", vec![Operand::near_code(0x20)]),
            Instruction::new(0x14, 11, "mov", vec![]),
            Instruction::new(0x1f, 1, "ret", vec![]),
            Instruction::new(0x20, 5, "mov", vec![]),
            Instruction::new(0x25, 1, "ret", vec![]),
        ]);
        let chart = build_flow_chart(|a| code.get(&a).cloned(), 0x10, 0x26);
        assert_eq!(chart.len(), 3);
        assert_eq!(chart.blocks[0].start_address, 0x10);
        assert_eq!(chart.blocks[0].end_address, 0x14);
        assert_eq!(chart.blocks[0].successors, vec![0x20, 0x14]);
        let rets: Vec<u64> = chart.return_blocks().map(|b| b.start_address).collect();
        assert_eq!(rets, vec![0x14, 0x20]);
    }

    #[test]
    fn stops_at_undecodable_bytes() {
        let code = listing(vec![
            Instruction::new(0x100, 3, "mov", vec![]),
            Instruction::new(0x103, 1, "ret", vec![]),
        ]);
        let chart = build_flow_chart(|a| code.get(&a).cloned(), 0x100, 0x200);
        assert_eq!(chart.len(), 1);
        assert_eq!(chart.blocks[0].end_address, 0x104);
        assert!(chart.blocks[0].is_return());
    }

    #[test]
    fn classify_mnemonics() {
        let ret = Instruction::new(0, 1, "RET", vec![]);
        assert_eq!(classify(&ret), ControlFlow::Return);
        let jmp = Instruction::new(0, 2, "jmp", vec![Operand::near_code(0x40)]);
        assert_eq!(
            classify(&jmp),
            ControlFlow::Jump {
                target: Some(0x40),
                conditional: false
            }
        );
        let b_ne = Instruction::new(0, 4, "b.ne", vec![Operand::near_code(0x8)]);
        assert!(matches!(
            classify(&b_ne),
            ControlFlow::Jump {
                conditional: true,
                ..
            }
        ));
        assert_eq!(
            classify(&Instruction::new(0, 2, "ud2", vec![])),
            ControlFlow::Stop
        );
    }
}
