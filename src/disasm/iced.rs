use crate::core::disassembler::{
    Architecture, Disassembler, DisassemblerError, DisassemblerResult,
};
use crate::core::instruction::{Instruction, Operand, OperandKind};

/// x86/x86-64 single-instruction decoder backed by iced-x86.
pub struct IcedDisassembler {
    bits: u32,
    arch: Architecture,
}

impl IcedDisassembler {
    pub fn new(arch: Architecture) -> DisassemblerResult<Self> {
        let bits = match arch {
            Architecture::X86 => 32,
            Architecture::X86_64 => 64,
            other => return Err(DisassemblerError::UnsupportedArchitecture(other)),
        };
        Ok(Self { bits, arch })
    }

    fn register_name(reg: iced_x86::Register) -> String {
        format!("{:?}", reg).to_ascii_lowercase()
    }

    fn iced_operands(instr: &iced_x86::Instruction) -> Vec<Operand> {
        use iced_x86::{OpKind, Register as IReg};
        let mut out = Vec::new();
        for i in 0..instr.op_count() {
            match instr.op_kind(i) {
                OpKind::Register => out.push(Operand::register(Self::register_name(
                    instr.op_register(i),
                ))),
                OpKind::Memory => {
                    let base = instr.memory_base();
                    let index = instr.memory_index();
                    if instr.is_ip_rel_memory_operand() {
                        out.push(Operand::direct_memory(instr.ip_rel_memory_address()));
                    } else if base == IReg::None && index == IReg::None {
                        out.push(Operand::direct_memory(instr.memory_displacement64()));
                    } else {
                        let reg = if base != IReg::None { base } else { index };
                        out.push(Operand::indirect_memory(
                            Self::register_name(reg),
                            instr.memory_displacement64(),
                        ));
                    }
                }
                OpKind::Immediate8 => out.push(Operand::immediate(u64::from(instr.immediate8()))),
                OpKind::Immediate16 => {
                    out.push(Operand::immediate(u64::from(instr.immediate16())))
                }
                OpKind::Immediate32 => {
                    out.push(Operand::immediate(u64::from(instr.immediate32())))
                }
                OpKind::Immediate64 => out.push(Operand::immediate(instr.immediate64())),
                OpKind::Immediate8to16
                | OpKind::Immediate8to32
                | OpKind::Immediate8to64
                | OpKind::Immediate32to64 => out.push(Operand::immediate(instr.immediate(i))),
                OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                    out.push(Operand::near_code(instr.near_branch_target()))
                }
                OpKind::FarBranch16 | OpKind::FarBranch32 => out.push(Operand {
                    kind: OperandKind::FarCode,
                    value: u64::from(instr.far_branch32()),
                    register: None,
                }),
                // String-instruction and segment forms carry nothing the heuristics read.
                _ => {}
            }
        }
        out
    }
}

impl Disassembler for IcedDisassembler {
    fn disassemble_instruction(&self, address: u64, bytes: &[u8]) -> DisassemblerResult<Instruction> {
        use iced_x86::{Decoder, DecoderOptions};

        if bytes.is_empty() {
            return Err(DisassemblerError::InsufficientBytes(address));
        }
        let mut decoder = Decoder::with_ip(self.bits, bytes, address, DecoderOptions::NONE);
        let instr = decoder.decode();
        if instr.is_invalid() {
            return Err(match decoder.last_error() {
                iced_x86::DecoderError::NoMoreBytes => DisassemblerError::InsufficientBytes(address),
                _ => DisassemblerError::InvalidInstruction(address),
            });
        }
        let mnemonic = format!("{:?}", instr.mnemonic());
        Ok(Instruction::new(
            address,
            instr.len() as u16,
            mnemonic,
            Self::iced_operands(&instr),
        ))
    }

    fn max_instruction_length(&self) -> usize {
        15
    }

    fn architecture(&self) -> Architecture {
        self.arch
    }

    fn name(&self) -> &str {
        "iced-x86"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x64() -> IcedDisassembler {
        IcedDisassembler::new(Architecture::X86_64).unwrap()
    }

    #[test]
    fn rip_relative_load_is_direct_memory() {
        // mov rax, [rip+0x10]
        let ins = x64()
            .disassemble_instruction(0x1000, &[0x48, 0x8b, 0x05, 0x10, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(ins.mnemonic, "mov");
        assert_eq!(ins.length, 7);
        assert_eq!(ins.operand_kind(0), Some(OperandKind::Register));
        assert_eq!(ins.operand(0).unwrap().register.as_deref(), Some("rax"));
        assert_eq!(ins.operand_kind(1), Some(OperandKind::DirectMemory));
        assert_eq!(ins.operand_value(1), Some(0x1017));
    }

    #[test]
    fn store_immediate_to_global() {
        // mov dword [rip+0xff6], 7
        let bytes = [0xc7, 0x05, 0xf6, 0x0f, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00];
        let ins = x64().disassemble_instruction(0x1000, &bytes).unwrap();
        assert!(ins.is_mov());
        assert_eq!(ins.operand_kind(0), Some(OperandKind::DirectMemory));
        assert_eq!(ins.operand_value(0), Some(0x2000));
        assert_eq!(ins.operand_kind(1), Some(OperandKind::Immediate));
        assert_eq!(ins.operand_value(1), Some(7));
    }

    #[test]
    fn base_displacement_is_indirect() {
        // mov rax, [rbx+8]
        let ins = x64()
            .disassemble_instruction(0x1000, &[0x48, 0x8b, 0x43, 0x08])
            .unwrap();
        let op = ins.operand(1).unwrap();
        assert_eq!(op.kind, OperandKind::IndirectMemory);
        assert_eq!(op.value, 8);
        assert_eq!(op.register.as_deref(), Some("rbx"));
    }

    #[test]
    fn branches_and_returns() {
        let d = x64();
        let je = d.disassemble_instruction(0x1000, &[0x74, 0x10]).unwrap();
        assert_eq!(je.mnemonic, "je");
        assert_eq!(je.operand_kind(0), Some(OperandKind::NearCode));
        assert_eq!(je.operand_value(0), Some(0x1012));
        let ret = d.disassemble_instruction(0x1002, &[0xc3]).unwrap();
        assert_eq!(ret.mnemonic, "ret");
    }

    #[test]
    fn absolute_address_in_32_bit_mode() {
        // mov eax, [0x2000]
        let d = IcedDisassembler::new(Architecture::X86).unwrap();
        let ins = d
            .disassemble_instruction(0x1000, &[0xa1, 0x00, 0x20, 0x00, 0x00])
            .unwrap();
        assert_eq!(ins.operand_kind(1), Some(OperandKind::DirectMemory));
        assert_eq!(ins.operand_value(1), Some(0x2000));
    }

    #[test]
    fn rejects_other_architectures_and_short_input() {
        assert!(matches!(
            IcedDisassembler::new(Architecture::ARM64),
            Err(DisassemblerError::UnsupportedArchitecture(Architecture::ARM64))
        ));
        assert_eq!(
            x64().disassemble_instruction(0x1000, &[0x48, 0x8b]),
            Err(DisassemblerError::InsufficientBytes(0x1000))
        );
    }
}
