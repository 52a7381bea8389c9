use clap::{ArgGroup, Parser};

/// Easy Switcher - keyboard layout switcher.
/// Converts text typed in the wrong keyboard layout: a double tap of
/// Shift deletes the last word and retypes it after emitting your
/// layout-switch shortcut.
#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("mode").args(["configure", "run", "debug"])))]
#[command(
    name = "easy-switcher",
    version,
    about,
    long_about = "Easy Switcher - keyboard layout switcher.\n\
Converts text typed in the wrong keyboard layout. By default a double tap of Shift\n\
corrects the last word, and a double tap while holding the other Shift corrects\n\
everything back to the previous line break.\n\
\n\
The daemon reads every attached keyboard, so it must run as root (or with read\n\
access to /dev/input/event* and write access to /dev/uinput).\n\
\n\
Run 'easy-switcher --configure' once to record your layout-switch shortcut into\n\
/etc/easy-switcher/default.conf, then start the daemon with 'easy-switcher --run'."
)]
pub struct Args {
    /// Run the interactive configuration wizard.
    #[arg(short = 'c', long)]
    pub configure: bool,

    /// Run the daemon.
    #[arg(short = 'r', long)]
    pub run: bool,

    /// Run the daemon with verbose event logging to stdout.
    #[arg(short = 'd', long)]
    pub debug: bool,
}

pub fn parse_args() -> Args {
    Args::parse()
}
