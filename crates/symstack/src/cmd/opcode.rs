//! Opcode command - print the stack effect of mnemonics

use eyre::Result;
use symstack_engine::{resolve_mnemonic, Opcode};

/// One line per mnemonic: canonical name, pops and pushes
pub fn show_opcodes(mnemonics: &[String]) -> Result<()> {
    for mnemonic in mnemonics {
        println!("{}", describe_opcode(mnemonic));
    }
    Ok(())
}

fn describe_opcode(mnemonic: &str) -> String {
    match resolve_mnemonic(mnemonic) {
        Some(effect) => {
            let name = match Opcode::parse(mnemonic) {
                // canonical name, so legacy aliases show what they resolve to
                Opcode::Other(_) => effect.name.to_string(),
                numbered => numbered.to_string(),
            };
            format!("{name:<14} pops {:>2}  pushes {:>2}", effect.pops, effect.pushes)
        }
        None => format!("{:<14} unknown opcode", mnemonic.trim()),
    }
}
