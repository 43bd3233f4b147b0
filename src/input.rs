use anyhow::{Result, bail};
use std::io::{self, IsTerminal, Read};
use zeroize::Zeroizing;

/// Entry text from the command line, or else from stdin.
pub fn read_entry(arg: Option<String>) -> Result<Zeroizing<String>> {
    //  Argument
    //  diarist write "Today was good."
    if let Some(text) = arg {
        return non_blank(Zeroizing::new(text));
    }

    //  stdin (Pipeline)
    //  cat notes.txt | diarist write --date 2024-01-15
    //  Interactive: type the entry, finish with Ctrl-D
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprintln!("Write your entry, finish with Ctrl-D:");
    }

    let mut buf = Zeroizing::new(String::new());
    stdin.lock().read_to_string(&mut buf)?;
    trim_newline(&mut buf);

    non_blank(buf)
}

fn non_blank(text: Zeroizing<String>) -> Result<Zeroizing<String>> {
    if text.trim().is_empty() {
        bail!("entry cannot be empty");
    }
    Ok(text)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
