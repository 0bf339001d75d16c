use std::io::Write;

use slate_runtime::{Image, Machine};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const USAGE: &str = "Usage: slate <program.sbc>";

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut positional: Vec<String> = Vec::new();
    for a in &argv {
        if a == "-h" || a == "--help" {
            println!("{USAGE}");
            return;
        }
        positional.push(a.clone());
    }
    if positional.len() != 1 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }
    let path = positional[0].as_str();

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(2);
        }
    };
    let image = match Image::load(&bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(2);
        }
    };

    let mut machine = Machine::new(image);
    let result = machine.run();

    // Program output is buffered during the run and written once,
    // whether or not the run ended in an exception.
    let output = machine.take_output();
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = write!(stdout, "{output}") {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            eprintln!("stdout error: {e}");
            std::process::exit(2);
        }
    }
    let _ = stdout.flush();

    if let Err(e) = result {
        eprintln!("{}", e.render(&machine.image));
        std::process::exit(1);
    }
}
