//! Interactive command parsing

use std::str::FromStr;

use beatkeeper_core::{BeatkeeperError, DetectionMode, Subdivision, Timbre, TimeSignature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("Not a number: {0}")]
    NotANumber(String),
    #[error(transparent)]
    Invalid(#[from] BeatkeeperError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Toggle,
    Tempo(i32),
    Nudge(i32),
    Tap,
    Signature(TimeSignature),
    Subdivision(Subdivision),
    Accent(u8),
    Subdivisions(bool),
    Timbre(Timbre),
    Volume(f32),
    Mute(bool),
    /// `None` turns the pattern off
    Pattern(Option<(i32, i32)>),
    Listen,
    Unlisten,
    Mode(DetectionMode),
    Sensitivity(f32),
    Sync,
    Status,
    Save,
    Help,
    Quit,
}

pub const HELP: &str = "\
start | stop | space       start, stop or toggle the click
tempo <bpm> | + | -        set or nudge the tempo
tap                        tap the tempo
sig <n/d>                  time signature, e.g. 7/8
sub <quarter|eighth|sixteenth>
accent <beat>              toggle emphasis on a beat
subs <on|off>              play subdivision clicks
sound <click|woodblock|beep|cowbell>
volume <0..1>
mute <on|off>              mute every other bar
pattern <active> <silent> | pattern off
listen | unlisten          microphone tempo detection
mode <bass|drums|guitar|mixed>
sensitivity <0..100>
sync                       adopt the detected tempo
status | save | quit";

fn arg<'a>(args: &mut impl Iterator<Item = &'a str>, name: &'static str) -> Result<&'a str, CommandError> {
    args.next().ok_or(CommandError::MissingArgument(name))
}

fn number<T: FromStr>(text: &str) -> Result<T, CommandError> {
    text.parse().map_err(|_| CommandError::NotANumber(text.to_string()))
}

fn switch(text: &str) -> Result<bool, CommandError> {
    match text {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(BeatkeeperError::UnknownVariant { kind: "switch", value: other.to_string() }.into()),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line == " " {
            return Ok(Command::Toggle);
        }

        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Unknown(String::new()));
        };

        let command = match head.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "space" | "toggle" => Command::Toggle,
            "tempo" | "bpm" => Command::Tempo(number(arg(&mut words, "tempo")?)?),
            "+" => Command::Nudge(1),
            "-" => Command::Nudge(-1),
            "tap" | "t" => Command::Tap,
            "sig" | "signature" => Command::Signature(arg(&mut words, "sig")?.parse()?),
            "sub" | "subdivision" => Command::Subdivision(arg(&mut words, "sub")?.parse()?),
            "accent" => Command::Accent(number(arg(&mut words, "accent")?)?),
            "subs" => Command::Subdivisions(switch(arg(&mut words, "subs")?)?),
            "sound" | "timbre" => Command::Timbre(arg(&mut words, "sound")?.parse()?),
            "volume" | "vol" => Command::Volume(number(arg(&mut words, "volume")?)?),
            "mute" => Command::Mute(switch(arg(&mut words, "mute")?)?),
            "pattern" => {
                let first = arg(&mut words, "pattern")?;
                if first == "off" {
                    Command::Pattern(None)
                } else {
                    let silent = arg(&mut words, "pattern")?;
                    Command::Pattern(Some((number(first)?, number(silent)?)))
                }
            }
            "listen" => Command::Listen,
            "unlisten" => Command::Unlisten,
            "mode" => Command::Mode(arg(&mut words, "mode")?.parse()?),
            "sensitivity" => Command::Sensitivity(number(arg(&mut words, "sensitivity")?)?),
            "sync" => Command::Sync,
            "status" | "s" => Command::Status,
            "save" => Command::Save,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}
