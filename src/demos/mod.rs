//! Ready-made workflows behind the CLI subcommands.
//!
//! Each constructor takes the generator to use, so the same workflows run
//! against a live provider from the CLI and against scripted fakes in tests.

pub mod calendar;
pub mod knowledge;
pub mod support;
pub mod validation;

use chrono::{DateTime, Local, TimeZone};

/// Date line prepended to prompts that resolve relative dates.
#[must_use]
pub fn today_context() -> String {
    date_context(&Local::now())
}

fn date_context<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Today is {}.", now.format("%A, %B %-d, %Y"))
}
