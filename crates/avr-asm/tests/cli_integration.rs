//! Integration tests for the avr-asm CLI.

#![allow(clippy::pedantic, clippy::nursery)]

use avr_asm as _;
use avr_isa as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing as _;
use tracing_subscriber as _;

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_avr-asm"))
}

fn create_temp_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(binary_path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run avr-asm")
}

#[test]
fn build_simple_program() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "simple.asm", b"add r0, r1\nnop\n");
    let output = temp_dir.path().join("simple.bin");

    let result = run(&[
        "build",
        source.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);

    assert!(result.status.success());
    assert_eq!(fs::read(&output).unwrap(), vec![0x01, 0x0C, 0x00, 0x00]);
}

#[test]
fn build_with_default_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "blink.asm", b"nop\n");

    let status = Command::new(binary_path())
        .args(["build", source.to_str().unwrap()])
        .current_dir(temp_dir.path())
        .status()
        .expect("failed to run avr-asm");

    assert!(status.success());
    assert!(temp_dir.path().join("blink.bin").exists());
}

#[test]
fn build_reports_every_error_with_location() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(
        temp_dir.path(),
        "bad.asm",
        b"  frob r1\n  ldi r3, 1\n  rjmp nowhere\n",
    );

    let result = run(&["build", source.to_str().unwrap()]);

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    let file = source.display().to_string();
    assert!(stderr.contains(&format!("{file}:1:3: error: unknown instruction: frob")), "{stderr}");
    assert!(stderr.contains(&format!("{file}:2:7: error: illegal register r3")), "{stderr}");
    assert!(stderr.contains(&format!("{file}:3:8: error: undefined symbol 'nowhere'")), "{stderr}");
    assert!(!temp_dir.path().join("bad.bin").exists());
}

#[test]
fn build_verbose_prints_listing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "verbose.asm", b"add r0, r1\n");
    let output = temp_dir.path().join("verbose.bin");

    let result = run(&[
        "build",
        source.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--verbose",
    ]);

    assert!(result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("0000: 01 0c"), "{stderr}");
    assert!(stderr.contains("add r0, r1"));
}

#[test]
fn build_for_xmega_accepts_extended_instructions() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "xch.asm", b"xch z, r4\n");
    let output = temp_dir.path().join("xch.bin");

    let classic = run(&["build", source.to_str().unwrap(), "-o", output.to_str().unwrap()]);
    assert!(!classic.status.success());

    let extended = run(&[
        "build",
        source.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--arch",
        "xmega",
    ]);
    assert!(extended.status.success());
    assert_eq!(fs::read(&output).unwrap(), vec![0x44, 0x92]);
}

#[test]
fn disasm_prints_to_stdout() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = create_temp_file(temp_dir.path(), "prog.bin", &[0x01, 0x0C, 0xFF, 0xCF, 0xFF, 0xFF]);

    let result = run(&["disasm", image.to_str().unwrap()]);

    assert!(result.status.success());
    assert_eq!(
        String::from_utf8_lossy(&result.stdout),
        "add r0,r1\nrjmp .-2\n.db 0xff,0xff\n"
    );
}

#[test]
fn disasm_formatting_flags() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = create_temp_file(temp_dir.path(), "branch.bin", &[0x19, 0xF0, 0xFF, 0xFF]);
    let listing = temp_dir.path().join("branch.lst");

    let result = run(&[
        "disasm",
        image.to_str().unwrap(),
        "--addresses",
        "--bytes",
        "--resolve",
        "--avr-as",
        "--start",
        "0x100",
        "-o",
        listing.to_str().unwrap(),
    ]);

    assert!(result.status.success());
    assert_eq!(
        fs::read_to_string(&listing).unwrap(),
        "0100: breq 0x106 ; 19 f0\n0102: .byte 0xff,0xff ; ff ff\n"
    );
}

#[test]
fn disasm_reads_stdin() {
    let mut child = Command::new(binary_path())
        .args(["disasm", "--stdin", "--lower"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to run avr-asm");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&[0xC0, 0x96])
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "adiw r24,0x30\n");
}

#[test]
fn build_then_disasm_round_trips() {
    let temp_dir = tempfile::tempdir().unwrap();
    let program = "\
.equ DDRB = 0x04
.equ PORTB = 0x05
start:  ldi r16, 0xff
        out DDRB, r16
loop:   sbi PORTB, 5
        rcall wait
        cbi PORTB, 5
        rcall wait
        rjmp loop
wait:   ldi r24, 0x10
        ldi r25, 0x00
spin:   sbiw r25:r24, 1
        brne spin
        ret
";
    let source = create_temp_file(temp_dir.path(), "blink.asm", program.as_bytes());
    let image = temp_dir.path().join("blink.bin");
    let build = run(&["build", source.to_str().unwrap(), "-o", image.to_str().unwrap()]);
    assert!(build.status.success(), "{}", String::from_utf8_lossy(&build.stderr));

    let result = run(&["disasm", image.to_str().unwrap()]);
    assert!(result.status.success());
    assert_eq!(
        String::from_utf8_lossy(&result.stdout),
        "\
ser r16
out 0x04,r16
sbi 0x05,5
rcall .+8
cbi 0x05,5
rcall .+4
rjmp .-8
ldi r24,0x10
ldi r25,0x00
sbiw r25:r24,0x01
brne .-2
ret
"
    );
}

#[test]
fn help_shows_usage() {
    let result = run(&["--help"]);
    assert!(result.status.success());
    assert!(String::from_utf8_lossy(&result.stdout).contains("Usage: avr-asm"));
}

#[test]
fn unknown_command_fails() {
    let result = run(&["frobnicate"]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("unknown command"));
}

#[test]
fn unknown_architecture_fails() {
    let result = run(&["disasm", "x.bin", "--arch", "pic16"]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("unknown architecture 'pic16'"));
}
