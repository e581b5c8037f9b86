use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use just_player_core::{
    AbortHandle, Block, CommandTree, Interpreter, JsonLinesSink, JsonTreeParser, Line, MidiSink,
    PlayerConfig, RecordingSleeper, ScoreParser, Sleeper, ThreadSleeper, TracingSink,
};
use tracing_subscriber::EnvFilter;

fn main() -> just_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.session.config()?;
    let interrupt = Interrupt::install();

    match cli.command {
        Commands::Play { files, dry_run } => {
            run_files(&files, &config, &cli.session, dry_run, &interrupt)
        }
        Commands::Repl => run_repl(&config, &cli.session, &interrupt),
    }
}

/// Ctrl-C state shared with the signal handler.
///
/// The handler aborts the watched interpreter, whose walk then returns
/// before its next line so the caller can silence every note.
#[derive(Debug, Clone, Default)]
struct Interrupt {
    requested: Arc<AtomicBool>,
    active: Arc<Mutex<Option<AbortHandle>>>,
}

impl Interrupt {
    fn install() -> Self {
        let interrupt = Self::default();
        let handler = interrupt.clone();
        if let Err(err) = ctrlc::set_handler(move || handler.trigger()) {
            tracing::warn!(error = %err, "failed to install Ctrl-C handler");
        }
        interrupt
    }

    fn trigger(&self) {
        tracing::warn!("interrupted, stopping");
        self.requested.store(true, Ordering::SeqCst);
        if let Ok(active) = self.active.lock() {
            if let Some(handle) = active.as_ref() {
                handle.abort();
            }
        }
    }

    fn watch(&self, interpreter: &Interpreter) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(interpreter.abort_handle());
        }
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

fn run_files(
    files: &[PathBuf],
    config: &PlayerConfig,
    session: &SessionArgs,
    dry_run: bool,
    interrupt: &Interrupt,
) -> just_player_core::Result<()> {
    for file in files {
        if interrupt.requested() {
            tracing::info!(?file, "skipping remaining scores");
            break;
        }
        run_file(file, config, session, dry_run, interrupt)?;
    }
    Ok(())
}

fn run_file(
    path: &Path,
    config: &PlayerConfig,
    session: &SessionArgs,
    dry_run: bool,
    interrupt: &Interrupt,
) -> just_player_core::Result<()> {
    tracing::info!(?path, "running score");
    let text = std::fs::read_to_string(path)?;

    let recorded = RecordingSleeper::new();
    let sleeper: Box<dyn Sleeper> = if dry_run {
        Box::new(recorded.clone())
    } else {
        Box::new(ThreadSleeper)
    };
    let mut interpreter = Interpreter::new(config, session.sink(), sleeper)?;
    interrupt.watch(&interpreter);

    let result = JsonTreeParser
        .parse(&text)
        .and_then(|tree| interpreter.process(&tree));
    interpreter.stop();

    if dry_run {
        tracing::info!(?path, total = ?recorded.total(), "dry run finished");
    }
    result
}

fn run_repl(
    config: &PlayerConfig,
    session: &SessionArgs,
    interrupt: &Interrupt,
) -> just_player_core::Result<()> {
    tracing::info!("running interactive session");
    let interpreter = Interpreter::new(config, session.sink(), ThreadSleeper)?;
    // The prompt goes to stderr so stdout only carries device messages and
    // state dumps.
    repl(
        interpreter,
        interrupt,
        std::io::stdin().lock(),
        std::io::stderr(),
        std::io::stdout(),
    )
}

/// Runs an interactive session and silences every note when it ends, also
/// when reading or writing fails.
fn repl(
    mut interpreter: Interpreter,
    interrupt: &Interrupt,
    input: impl BufRead,
    prompt: impl Write,
    output: impl Write,
) -> just_player_core::Result<()> {
    interrupt.watch(&interpreter);
    let result = read_commands(&mut interpreter, interrupt, input, prompt, output);
    interpreter.stop();
    result
}

/// Applies one JSON command per line until end of input or Ctrl-C.
fn read_commands(
    interpreter: &mut Interpreter,
    interrupt: &Interrupt,
    mut input: impl BufRead,
    mut prompt: impl Write,
    mut output: impl Write,
) -> just_player_core::Result<()> {
    let mut buffer = String::new();
    while !interrupt.requested() {
        write!(prompt, ":> ")?;
        prompt.flush()?;

        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            break;
        }
        if interrupt.requested() {
            break;
        }

        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }
        if line == "state" {
            match serde_json::to_string_pretty(&interpreter.snapshot()) {
                Ok(state) => writeln!(output, "{state}")?,
                Err(err) => tracing::error!(error = %err, "failed to render state"),
            }
            continue;
        }

        let parsed: Result<Line, _> = serde_json::from_str(line);
        match parsed {
            Ok(line) => {
                let tree = CommandTree::new(vec![Block::Line(line)]);
                if let Err(err) = interpreter.process(&tree) {
                    tracing::error!(error = %err, "command failed");
                }
            }
            Err(err) => tracing::error!(error = %err, input = line, "failed to parse"),
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Play just-intonation scores on a MIDI device", long_about = None)]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// JSON configuration file; missing fields keep their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Initial tempo in beats per minute.
    #[arg(long, global = true)]
    bpm: Option<u32>,
    /// Default program for notes without an override.
    #[arg(long, global = true)]
    program: Option<u8>,
    /// Number of device channels available for simultaneous notes.
    #[arg(long, global = true)]
    channels: Option<usize>,
    /// Where device messages go.
    #[arg(long, value_enum, default_value_t = Output::Log, global = true)]
    output: Output,
}

impl SessionArgs {
    fn config(&self) -> just_player_core::Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load(path)?,
            None => PlayerConfig::default(),
        };
        if let Some(bpm) = self.bpm {
            config.tempo.bpm = bpm;
        }
        if let Some(program) = self.program {
            config.default_program = program;
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        config.validate()?;
        Ok(config)
    }

    fn sink(&self) -> Box<dyn MidiSink> {
        match self.output {
            Output::Log => Box::new(TracingSink),
            Output::Json => Box::new(JsonLinesSink::new(std::io::stdout())),
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    /// Log each message.
    Log,
    /// Write one JSON object per message to stdout.
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play command-tree files in order, silencing all notes after each.
    Play {
        /// Command trees produced by the score parser, as JSON.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Skip the pauses and report the total playing time instead.
        #[arg(long)]
        dry_run: bool,
    },
    /// Read one JSON command per line from stdin; `state` prints the session.
    Repl,
}
