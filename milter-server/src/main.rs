mod filter;

use crate::filter::{ExampleFilter, ExtraHeader};
use anyhow::{anyhow, Context, Error};
use getopts::Options;
use milter_embedded::{Actions, Server};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::env;
use std::fs::File;
use std::path::Path;
use time::OffsetDateTime;

const DEFAULT_WORKING_DIR: &str = ".";
const DEFAULT_SOCKET: &str = "inet:8890@127.0.0.1";

// Command line option names
const OPT_HELP: &str = "help";
const OPT_SOCKET: &str = "socket";
const OPT_LOG: &str = "log";
const OPT_REJECT_RCPT: &str = "reject-rcpt";
const OPT_HEADER: &str = "header";

fn setup_logger(log_dir: &str) -> Result<(), Error> {
    let log_path = Path::new(&log_dir);
    let format =
        time::format_description::parse_borrowed::<1>("[year][month][day][hour][minute][second]")?;
    let datetime = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(&format)?;
    let filename = format!("milter-{}.log", datetime);
    let filepath = log_path.join(filename);
    let file = File::create(&filepath)
        .with_context(|| format!("Cannot create log file {}", filepath.display()))?;
    let term_logger: Box<dyn SharedLogger> = TermLogger::new(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    // Sessions run on their own threads, so every file log record names its thread
    let file_config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Trace)
        .build();
    CombinedLogger::init(vec![
        term_logger,
        WriteLogger::new(LevelFilter::Trace, file_config, file),
    ])
    .map_err(|err| anyhow!("Cannot initialize logger: {}", err))
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn run() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();
    let mut opts = getopts::Options::new();
    opts.optflag("h", OPT_HELP, "print this help menu");
    opts.optopt(
        "s",
        OPT_SOCKET,
        "the socket to listen on, e.g. inet:8890@localhost or unix:/run/milter.sock",
        "SPEC",
    );
    opts.optopt("l", OPT_LOG, "the directory to write logs to", "LOG_DIR");
    opts.optmulti("", OPT_REJECT_RCPT, "reject mail to this recipient", "ADDRESS");
    opts.optopt("", OPT_HEADER, "add a header to every message", "NAME:VALUE");
    let matches = opts
        .parse(&args[1..])
        .map_err(|err| anyhow!("Error parsing command line: {}", err))?;
    if matches.opt_present(OPT_HELP) {
        print_usage(&args[0], &opts);
        return Ok(());
    }
    let log_directory = matches
        .opt_str(OPT_LOG)
        .unwrap_or_else(|| DEFAULT_WORKING_DIR.to_owned());
    setup_logger(&log_directory)?;
    let header = matches
        .opt_str(OPT_HEADER)
        .map(|h| h.parse::<ExtraHeader>())
        .transpose()?;
    let socket = matches
        .opt_str(OPT_SOCKET)
        .unwrap_or_else(|| DEFAULT_SOCKET.to_owned());
    let filter = ExampleFilter::new(matches.opt_strs(OPT_REJECT_RCPT), header);
    let mut server = Server::new(filter);
    server
        .with_actions(Actions::ADD_HEADER)
        .with_addr(&socket)?;
    server.serve_forever()?;
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}
