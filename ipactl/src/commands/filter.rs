//! `ipactl filter`: run one of the text filters from the command line.

use anyhow::Result;
use ipa_common::ReconcileError;
use ipa_common::filters::{self, FILTER_NAMES};

pub fn run(list: bool, name: Option<&str>, input: Option<&str>, args: &[String]) -> Result<()> {
    if list {
        for name in FILTER_NAMES {
            println!("{name}");
        }
        return Ok(());
    }
    let (Some(name), Some(input)) = (name, input) else {
        let err = ReconcileError::validation("filter", "a NAME and INPUT are required (or --list)");
        return Err(err.into());
    };
    println!("{}", filters::apply(name, input, args)?);
    Ok(())
}
