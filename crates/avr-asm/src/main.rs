//! CLI entry point for the AVR assembler and disassembler.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read as _};
use std::path::{Path, PathBuf};

use avr_asm::assembler::{assemble, AssemblerSettings};
use avr_isa::{disassemble, format_listing, Architecture, DisassemblerSettings};
#[cfg(test)]
use tempfile as _;
use tracing as _;
use tracing_subscriber::EnvFilter;

const USAGE_TEXT: &str = "\
Usage: avr-asm <command> [options]

Commands:
  disasm <input> [options]   Disassemble a raw flash image
  build  <input> [options]   Assemble source to a raw flash image

Options:
  -o, --output <file>  Output file path (disasm: stdout, build: input stem + .bin)
  --arch <name>        Target architecture: atmega88, atmega328p, xmega
  -v, --verbose        Debug logging (build also prints the listing to stderr)
  -h, --help           Show this help message

Disassembly options:
  --avr-as             Print like avr-objdump (lower pair register, .byte)
  --addresses          Prefix each line with its address
  --bytes              Append the raw bytes of each line
  --resolve            Print relative jump targets as absolute addresses
  --lower              Print register pairs as their lower register
  --start <addr>       Address of the first byte (default 0)
  --stdin              Read the image from stdin instead of <input>

Examples:
  avr-asm build blink.asm --arch atmega328p
  avr-asm disasm blink.bin --addresses --bytes
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Disasm(DisasmArgs),
    Build(BuildArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct BuildArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    architecture: Architecture,
    verbose: bool,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, PartialEq, Eq, Default)]
struct DisasmArgs {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    architecture: Architecture,
    avr_as: bool,
    addresses: bool,
    bytes: bool,
    resolve: bool,
    lower: bool,
    start: u32,
    verbose: bool,
}

impl DisasmArgs {
    fn settings(&self) -> DisassemblerSettings {
        let mut settings = if self.avr_as {
            DisassemblerSettings::avr_as()
        } else {
            DisassemblerSettings::default()
        };
        settings.print_addresses |= self.addresses;
        settings.print_bytes |= self.bytes;
        settings.resolve_relative_addresses |= self.resolve;
        settings.print_compound_registers_as_lower |= self.lower;
        settings.start_address = self.start;
        settings
    }
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "disasm" => parse_disasm_args(args)
            .map(Command::Disasm)
            .map(ParseResult::Command),
        "build" => parse_build_args(args)
            .map(Command::Build)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_architecture(value: Option<OsString>) -> Result<Architecture, String> {
    let value = value.ok_or_else(|| "missing value for --arch".to_string())?;
    value
        .to_string_lossy()
        .parse::<Architecture>()
        .map_err(|e| e.to_string())
}

fn parse_address(value: Option<OsString>) -> Result<u32, String> {
    let value = value.ok_or_else(|| "missing value for --start".to_string())?;
    let text = value.to_string_lossy();
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .map_or_else(|| text.parse::<u32>(), |hex| u32::from_str_radix(hex, 16))
        .map_err(|_| format!("invalid start address: {text}"))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_build_args(mut args: impl Iterator<Item = OsString>) -> Result<BuildArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut architecture = Architecture::default();
    let mut verbose = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg == "-o" || arg == "--output" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for -o".to_string())?;
            output = Some(PathBuf::from(value));
            continue;
        }

        if arg == "--arch" {
            architecture = parse_architecture(args.next())?;
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(BuildArgs {
        input,
        output,
        architecture,
        verbose,
    })
}

#[allow(clippy::while_let_on_iterator)]
fn parse_disasm_args(mut args: impl Iterator<Item = OsString>) -> Result<DisasmArgs, String> {
    let mut parsed = DisasmArgs::default();
    let mut stdin = false;

    while let Some(arg) = args.next() {
        let flag = arg.to_string_lossy().to_string();
        match flag.as_str() {
            "--help" | "-h" => return Err(USAGE_TEXT.to_string()),
            "--verbose" | "-v" => parsed.verbose = true,
            "-o" | "--output" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for -o".to_string())?;
                parsed.output = Some(PathBuf::from(value));
            }
            "--arch" => parsed.architecture = parse_architecture(args.next())?,
            "--start" => parsed.start = parse_address(args.next())?,
            "--avr-as" => parsed.avr_as = true,
            "--addresses" => parsed.addresses = true,
            "--bytes" => parsed.bytes = true,
            "--resolve" => parsed.resolve = true,
            "--lower" => parsed.lower = true,
            "--stdin" => stdin = true,
            other if other.starts_with('-') => return Err(format!("unknown option: {other}")),
            _ => {
                if parsed.input.is_some() {
                    return Err("multiple input paths provided".to_string());
                }
                parsed.input = Some(PathBuf::from(arg));
            }
        }
    }

    match (stdin, &parsed.input) {
        (true, Some(_)) => Err("--stdin cannot be combined with an input path".to_string()),
        (false, None) => Err("missing input path".to_string()),
        _ => Ok(parsed),
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");

    let parent = input.parent().unwrap_or_else(|| Path::new(""));

    parent.join(format!("{stem}.bin"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_build(args: BuildArgs) -> Result<(), i32> {
    let settings = AssemblerSettings::for_architecture(args.architecture);
    let assembly = match assemble(&args.input, &settings) {
        Ok(assembly) => assembly,
        Err(errors) => {
            eprintln!("{}", errors.format_for_stderr());
            return Err(1);
        }
    };

    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));

    if let Err(e) = fs::write(&output_path, &assembly.bytes) {
        eprintln!("error: failed to write output: {e}");
        return Err(1);
    }

    if args.verbose {
        eprint!("{}", assembly.format_listing());
    }

    println!(
        "Assembled {} ({} bytes) -> {}",
        args.input.display(),
        assembly.bytes.len(),
        output_path.display()
    );

    Ok(())
}

fn run_disasm(args: &DisasmArgs) -> Result<(), i32> {
    let image = match &args.input {
        Some(path) => fs::read(path).map_err(|e| format!("{}: {e}", path.display())),
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .map(|_| buffer)
                .map_err(|e| format!("stdin: {e}"))
        }
    };
    let image = match image {
        Ok(image) => image,
        Err(e) => {
            eprintln!("error: I/O error: {e}");
            return Err(1);
        }
    };

    let settings = args.settings();
    let rows = disassemble(&image, args.architecture.table(), &settings);
    let listing = format_listing(&rows, &settings);

    match &args.output {
        Some(path) => fs::write(path, listing).map_err(|e| {
            eprintln!("error: failed to write output: {e}");
            1
        }),
        None => {
            print!("{listing}");
            Ok(())
        }
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Build(args))) => {
            init_logging(args.verbose);
            match run_build(args) {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Ok(ParseResult::Command(Command::Disasm(args))) => {
            init_logging(args.verbose);
            match run_disasm(&args) {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn os(args: &[&str]) -> impl Iterator<Item = OsString> {
        args.iter().map(OsString::from).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_build_command() {
        let result = parse_build_args(os(&["blink.asm", "-o", "out.bin", "--arch", "XMega", "-v"]))
            .expect("valid build args should parse");

        assert_eq!(
            result,
            BuildArgs {
                input: PathBuf::from("blink.asm"),
                output: Some(PathBuf::from("out.bin")),
                architecture: Architecture::XMega,
                verbose: true,
            }
        );
    }

    #[test]
    fn parses_disasm_command() {
        let result = parse_disasm_args(os(&[
            "blink.bin",
            "--addresses",
            "--bytes",
            "--resolve",
            "--start",
            "0x100",
            "--arch",
            "atmega328p",
        ]))
        .expect("valid disasm args should parse");

        assert_eq!(
            result,
            DisasmArgs {
                input: Some(PathBuf::from("blink.bin")),
                architecture: Architecture::ATMega328p,
                addresses: true,
                bytes: true,
                resolve: true,
                start: 0x100,
                ..DisasmArgs::default()
            }
        );
        let settings = result.settings();
        assert!(settings.print_addresses && settings.print_bytes);
        assert_eq!(settings.start_address, 0x100);
        assert_eq!(settings.byte_opcode, ".db");
    }

    #[test]
    fn avr_as_preset_switches_the_pseudo_op() {
        let result = parse_disasm_args(os(&["--stdin", "--avr-as"])).expect("stdin should parse");
        assert_eq!(result.input, None);
        let settings = result.settings();
        assert_eq!(settings.byte_opcode, ".byte");
        assert!(settings.print_compound_registers_as_lower);
    }

    #[test]
    fn disasm_rejects_stdin_with_input() {
        let error = parse_disasm_args(os(&["a.bin", "--stdin"])).expect_err("conflict");
        assert!(error.contains("--stdin"));
        let error = parse_disasm_args(os(&[])).expect_err("no input");
        assert!(error.contains("missing input"));
    }

    #[test]
    fn rejects_unknown_architecture() {
        let error = parse_build_args(os(&["a.asm", "--arch", "pic16"])).expect_err("bad arch");
        assert!(error.contains("pic16"));
    }

    #[test]
    fn rejects_bad_start_address() {
        let error = parse_disasm_args(os(&["a.bin", "--start", "zz"])).expect_err("bad start");
        assert_eq!(error, "invalid start address: zz");
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args(os(&["--help"])).expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse_args(os(&["unknown"])).expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn rejects_unknown_option() {
        let error = parse_disasm_args(os(&["a.bin", "--color"])).expect_err("unknown option");
        assert_eq!(error, "unknown option: --color");
    }

    #[test]
    fn default_output_path_simple() {
        assert_eq!(default_output_path(Path::new("blink.asm")), PathBuf::from("blink.bin"));
    }

    #[test]
    fn default_output_path_with_dir() {
        assert_eq!(default_output_path(Path::new("src/blink.S")), PathBuf::from("src/blink.bin"));
    }

    #[test]
    fn default_output_path_no_extension() {
        assert_eq!(default_output_path(Path::new("program")), PathBuf::from("program.bin"));
    }

    #[test]
    fn parse_build_missing_input() {
        let error = parse_build_args(std::iter::empty()).expect_err("missing input should fail");
        assert!(error.contains("missing input"));
    }
}
