//! Command-line configuration, parsed by hand from `env::args()` (no flag
//! parsing crate, matching the rest of this codebase's binaries).

use std::path::PathBuf;

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of input program files, one JSON `ProgramRecord` per file.
    pub programs_dir: PathBuf,
    /// Default failing-call position, used for any record that doesn't
    /// carry its own `k0`.
    pub start_idx: i64,
    /// Where minimized programs and the run summary are written.
    pub out: PathBuf,
    /// Percentage (0-100) of statically-seeded influence edges kept after
    /// dithering (spec §4.6).
    pub influence_proportion: u8,
    /// External oracle process: argv[0] plus any fixed arguments.
    pub oracle_cmd: Vec<String>,
    /// Opaque target tag, forwarded into every `Program` this run produces.
    pub target: String,
    /// Resume log path; defaults to `<out>/resume.jsonl`.
    pub resume_file: Option<PathBuf>,
    /// Oracle round-trip timeout.
    pub oracle_timeout_secs: u64,
}

impl Config {
    pub fn parse(args: &[String]) -> Result<Config> {
        let mut programs_dir = None;
        let mut start_idx = None;
        let mut out = None;
        let mut influence_proportion = 70u8;
        let mut oracle_cmd = None;
        let mut target = "default".to_string();
        let mut resume_file = None;
        let mut oracle_timeout_secs = 30u64;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--programs" => {
                    programs_dir = Some(PathBuf::from(next(args, &mut i)?));
                }
                "--start-idx" => {
                    start_idx = Some(next(args, &mut i)?.parse()?);
                }
                "--out" => {
                    out = Some(PathBuf::from(next(args, &mut i)?));
                }
                "--influence-proportion" => {
                    influence_proportion = next(args, &mut i)?.parse()?;
                }
                "--oracle-cmd" => {
                    oracle_cmd = Some(shell_words(&next(args, &mut i)?));
                }
                "--target" => {
                    target = next(args, &mut i)?;
                }
                "--resume-file" => {
                    resume_file = Some(PathBuf::from(next(args, &mut i)?));
                }
                "--oracle-timeout-secs" => {
                    oracle_timeout_secs = next(args, &mut i)?.parse()?;
                }
                other => bail!("unrecognized argument: {other}"),
            }
        }

        Ok(Config {
            programs_dir: programs_dir.ok_or_else(|| anyhow::anyhow!("--programs is required"))?,
            start_idx: start_idx.unwrap_or(-1),
            out: out.ok_or_else(|| anyhow::anyhow!("--out is required"))?,
            influence_proportion,
            oracle_cmd: oracle_cmd.ok_or_else(|| anyhow::anyhow!("--oracle-cmd is required"))?,
            target,
            resume_file,
            oracle_timeout_secs,
        })
    }

    pub fn resume_path(&self) -> PathBuf {
        self.resume_file.clone().unwrap_or_else(|| self.out.join("resume.jsonl"))
    }
}

fn next(args: &[String], i: &mut usize) -> Result<String> {
    *i += 1;
    let Some(v) = args.get(*i) else { bail!("{} expects a value", args[*i - 1]) };
    *i += 1;
    Ok(v.clone())
}

/// Splits `--oracle-cmd` on whitespace so callers can pass `"./oracle --flag"`
/// as one shell-style argument instead of juggling a repeated flag.
fn shell_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_required_flags() {
        let cfg = Config::parse(&args("--programs in --out out --oracle-cmd ./oracle")).unwrap();
        assert_eq!(cfg.programs_dir, PathBuf::from("in"));
        assert_eq!(cfg.out, PathBuf::from("out"));
        assert_eq!(cfg.oracle_cmd, vec!["./oracle".to_string()]);
        assert_eq!(cfg.start_idx, -1);
        assert_eq!(cfg.influence_proportion, 70);
    }

    #[test]
    fn missing_required_flag_errors() {
        assert!(Config::parse(&args("--out out --oracle-cmd ./oracle")).is_err());
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Config::parse(&args("--programs in --out out --oracle-cmd x --bogus 1")).is_err());
    }
}
