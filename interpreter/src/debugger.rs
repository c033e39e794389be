use std::io::{Stdout, Write};

use anyhow::{anyhow, bail, Result};
use crossterm::style::{style, Stylize};
use monc_lib::debugging::{Breakpoint, Debugger, VmDebugger};
use monc_lib::il::{IlModule, ListingWriter};
use monc_lib::vm::{Interpreter, Stop};
use rustyline::{error::ReadlineError, DefaultEditor};

#[derive(Debug, PartialEq, Clone)]
enum UserCommand {
    LastCommand,
    ShowRegisters,
    ShowMemory,
    ShowStack,
    Backtrace,
    List,
    /// 1-based line in the current source file
    SetBreakpoint(u32),
    SetBreakpointAt(usize, usize),
    RemoveBreakpoint(u32),
    StepOver,
    StepInto,
    StepOut,
    Step,
    Continue,
    Quit,
}

pub fn run(module: IlModule, entry: &str, args: &[i32], stdout: &mut Stdout) -> Result<()> {
    let mut debugger = Debugger::new(Interpreter::new());
    debugger.load_module(module);
    let mut vdbg = VmDebugger::new(debugger);
    vdbg.on_break(|frame| println!("Break at {}", frame));

    // stop after the first instruction
    vdbg.pause();
    if let Stop::Finished(res) = vdbg.call(entry, args)? {
        println!("Program exited with {}", res);
        return Ok(());
    }

    let mut rl = DefaultEditor::new()?;
    let mut last_cmd: Option<UserCommand> = None;

    use UserCommand::*;
    loop {
        print_location(stdout, &vdbg)?;
        stdout.flush()?;
        let mut cmd = read_line(&mut rl)?;
        if cmd == LastCommand {
            if let Some(last) = &last_cmd {
                cmd = last.clone();
            }
        }
        match &cmd {
            LastCommand => {
                // no command was given yet, nothing to repeat
            }
            ShowRegisters => show_registers(stdout, &vdbg)?,
            ShowMemory => show_memory(stdout, &vdbg)?,
            ShowStack => {
                for (i, elem) in vdbg.debugger().vm().operand_stack().iter().enumerate().rev() {
                    writeln!(stdout, "{}: {}", i, elem)?;
                }
            }
            Backtrace => show_backtrace(stdout, &vdbg)?,
            List => show_listing(stdout, &vdbg)?,
            SetBreakpoint(line) => match current_file(&vdbg) {
                Some(file) => match vdbg.debugger_mut().set_breakpoint_at_line(&file, line - 1) {
                    Some(bp) => writeln!(stdout, "Breakpoint set at {}", bp)?,
                    None => writeln!(stdout, "No code at {}:{}", file, line)?,
                },
                None => writeln!(stdout, "No source file at the current location")?,
            },
            SetBreakpointAt(function, address) => {
                vdbg.set_breakpoint(Breakpoint::new(*function, *address));
            }
            RemoveBreakpoint(line) => match current_file(&vdbg) {
                Some(file) => vdbg.debugger_mut().remove_breakpoint_at_line(&file, line - 1),
                None => writeln!(stdout, "No source file at the current location")?,
            },
            StepOver => {
                vdbg.step_over()?;
            }
            StepInto => {
                vdbg.step_into()?;
            }
            StepOut => {
                vdbg.step_out()?;
            }
            Step => {
                vdbg.step()?;
            }
            Continue => {
                vdbg.continue_()?;
            }
            Quit => return Ok(()),
        }

        let vm = vdbg.debugger().vm();
        if !vm.is_paused() {
            writeln!(stdout, "Program exited with {}", vm.return_value())?;
            return Ok(());
        }
        last_cmd = Some(cmd);
    }
}

fn read_line(rl: &mut DefaultEditor) -> Result<UserCommand> {
    loop {
        let line = rl.readline("(moncdbg) ");
        use ReadlineError::*;
        match line {
            Ok(line) => match parse_line(&line) {
                Ok(cmd) => {
                    if cmd != UserCommand::LastCommand {
                        rl.add_history_entry(line.as_str())?;
                    }
                    return Ok(cmd);
                }
                Err(e) => eprintln!("Error: {}", e),
            },
            Err(Interrupted | Eof) => return Ok(UserCommand::Quit),
            Err(other) => return Err(other.into()),
        }
    }
}

fn parse_line(line: &str) -> Result<UserCommand> {
    use UserCommand::*;
    let elems: Vec<_> = line.split_whitespace().collect();
    let Some((cmd, args)) = elems.split_first() else {
        return Ok(LastCommand);
    };

    Ok(match (*cmd, args) {
        ("reg", []) => ShowRegisters,
        ("read", []) => ShowMemory,
        ("stack", []) => ShowStack,
        ("bt", []) => Backtrace,
        ("list", []) => List,
        ("bp", [line]) => SetBreakpoint(parse_line_number(line)?),
        ("bpa", [function, address]) => SetBreakpointAt(function.parse()?, address.parse()?),
        ("rm", [line]) => RemoveBreakpoint(parse_line_number(line)?),
        ("over", []) => StepOver,
        ("into", []) => StepInto,
        ("out", []) => StepOut,
        ("step", []) => Step,
        ("continue" | "c", []) => Continue,
        ("quit" | "q", []) => Quit,
        _ => bail!("Invalid Command"),
    })
}

fn parse_line_number(s: &str) -> Result<u32> {
    match s.parse::<u32>()? {
        0 => Err(anyhow!("Line numbers start at 1")),
        line => Ok(line),
    }
}

fn current_file(vdbg: &VmDebugger) -> Option<String> {
    let dbg = vdbg.debugger();
    let frame = dbg.vm().stack_frame(0)?;
    let (file, _) = dbg.get_source_location(frame)?;
    (!file.is_empty()).then(|| file.to_owned())
}

fn print_location(stdout: &mut Stdout, vdbg: &VmDebugger) -> Result<()> {
    let dbg = vdbg.debugger();
    let Some(frame) = dbg.vm().stack_frame(0) else {
        return Ok(());
    };
    let Some(ins) = dbg
        .get_il_function(frame)
        .and_then(|function| function.code.original(frame.pc))
    else {
        return Ok(());
    };
    write!(stdout, "{:>8}:  {} \t{}", frame.pc, ins.op, ins.immediate)?;
    if let Some((file, line)) = dbg.get_source_location(frame) {
        write!(stdout, "\t; {}:{}", file, line + 1)?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn show_registers(stdout: &mut Stdout, vdbg: &VmDebugger) -> Result<()> {
    let dbg = vdbg.debugger();
    let vm = dbg.vm();
    if let Some(frame) = vm.stack_frame(0) {
        let name = vm
            .module()
            .and_then(|module| module.function_name(frame.function))
            .unwrap_or("<anonymous>");
        writeln!(stdout, "function: {} ({})", frame.function, name)?;
        writeln!(stdout, "pc:       {}", frame.pc)?;
        if let Some((file, line)) = dbg.get_source_location(frame) {
            writeln!(stdout, "source:   {}:{}", file, line + 1)?;
        }
    }
    writeln!(stdout, "return:   {}", vm.return_value())?;
    Ok(())
}

fn show_memory(stdout: &mut Stdout, vdbg: &VmDebugger) -> Result<()> {
    let Some(memory) = vdbg.debugger().vm().frame_memory(0) else {
        return Ok(());
    };
    for (row, chunk) in memory.as_slice().chunks(4).enumerate() {
        let cells: Vec<_> = chunk.iter().map(|v| format!("{:>11}", v)).collect();
        writeln!(stdout, "{:>6}: {}", row * 4, cells.join(" "))?;
    }
    Ok(())
}

fn show_backtrace(stdout: &mut Stdout, vdbg: &VmDebugger) -> Result<()> {
    let dbg = vdbg.debugger();
    let vm = dbg.vm();
    for depth in 0..vm.call_stack_frame_count() {
        let Some(frame) = vm.stack_frame(depth) else {
            break;
        };
        let name = vm
            .module()
            .and_then(|module| module.function_name(frame.function))
            .unwrap_or("<anonymous>");
        write!(stdout, "#{} {}@{}", depth, name, frame.pc)?;
        if let Some((file, line)) = dbg.get_source_location(frame) {
            write!(stdout, " at {}:{}", file, line + 1)?;
        }
        writeln!(stdout)?;
    }
    Ok(())
}

fn show_listing(stdout: &mut Stdout, vdbg: &VmDebugger) -> Result<()> {
    let dbg = vdbg.debugger();
    let Some(frame) = dbg.vm().stack_frame(0) else {
        return Ok(());
    };
    let Some(function) = dbg.get_il_function(frame) else {
        return Ok(());
    };
    let name = dbg
        .vm()
        .module()
        .and_then(|module| module.function_name(frame.function))
        .unwrap_or("");

    let mut writer = ListingWriter::new(Vec::new());
    writer.write_function(name, frame.function, function, Some(frame.pc))?;
    let listing = String::from_utf8_lossy(&writer.into_inner()).into_owned();
    for line in listing.lines() {
        if line.starts_with("->") {
            writeln!(stdout, "{}", style(line).reverse())?;
        } else {
            writeln!(stdout, "{}", line)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use UserCommand::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("").unwrap(), LastCommand);
        assert_eq!(parse_line("  over ").unwrap(), StepOver);
        assert_eq!(parse_line("c").unwrap(), Continue);
        assert_eq!(parse_line("bp 12").unwrap(), SetBreakpoint(12));
        assert_eq!(parse_line("bpa 1 4").unwrap(), SetBreakpointAt(1, 4));
        assert_eq!(parse_line("rm 3").unwrap(), RemoveBreakpoint(3));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("bp").is_err());
        assert!(parse_line("bp 0").is_err());
        assert!(parse_line("bp x").is_err());
        assert!(parse_line("over 2").is_err());
        assert!(parse_line("dance").is_err());
    }
}
