use std::fs;
use std::io::{self, stdin, stdout, Write};
use std::process;

use clap::{crate_version, Arg, Command};
use failure::{Fail, ResultExt};

use kaleidoscope::error::{Error, ErrorKind};
use kaleidoscope::toplevel::Session;

type Stdio = Session<io::Stdout, io::Stderr>;

fn run_file(session: &mut Stdio, path: &str) -> Result<(), Error> {
    let source = fs::read_to_string(path).context(ErrorKind::Io)?;
    session.run(&source)?;
    Ok(())
}

fn main_loop(session: &mut Stdio) -> Result<(), Error> {
    loop {
        eprint!("ready> ");
        io::stderr().flush().context(ErrorKind::Io)?;

        let mut line = String::new();
        if stdin().read_line(&mut line).context(ErrorKind::Io)? == 0 {
            return Ok(());
        }
        session.run(&line)?;
    }
}

fn main() {
    let args = Command::new("kaleidoscope")
        .version(crate_version!())
        .about("Kaleidoscope front end: parses source and lowers it to IR")
        .arg(
            Arg::new("input")
                .index(1)
                .takes_value(true)
                .value_name("FILE")
                .help("Source file; starts a REPL on stdin when omitted"),
        )
        .arg(
            Arg::new("dump-ir")
                .short('d')
                .long("dump-ir")
                .help("Print the IR of every accepted top-level unit"),
        )
        .arg(
            Arg::new("print-module")
                .short('m')
                .long("print-module")
                .help("Print the whole module once the input is exhausted"),
        )
        .get_matches();

    let mut session = Session::new(stdout(), io::stderr()).dump_ir(args.is_present("dump-ir"));

    let result = match args.value_of("input") {
        Some(path) => run_file(&mut session, path),
        None => main_loop(&mut session),
    };

    let result = result.and_then(|()| {
        if args.is_present("print-module") {
            let module = session.module().to_string();
            write!(session.output(), "{}", module).context(ErrorKind::Io)?;
        }
        Ok(())
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if let Some(cause) = e.cause() {
            eprintln!("  caused by: {}", cause);
        }
        process::exit(1);
    }
}
