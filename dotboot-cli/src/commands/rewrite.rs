use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use dotboot::{
    rewrite::{MetadataRewriter, ReferenceRewriter, RewriteMapping},
    AssemblyIdentity, AssemblyView,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_view,
    output::{print_output, Align, TabWriter},
};

pub struct RewriteOptions<'a> {
    pub map: &'a [String],
    pub live: &'a [PathBuf],
    pub output: &'a Path,
    pub prefix: &'a str,
    pub verify: bool,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
struct Retarget {
    rid: u32,
    from: String,
    to: String,
}

#[derive(Debug, Serialize)]
struct RewriteOutput {
    output: String,
    size: usize,
    mapped: usize,
    retargeted: Vec<Retarget>,
}

/// Parse `STABLE=DISPLAY NAME`; the first `=` separates the two.
fn parse_map_entry(entry: &str) -> anyhow::Result<(String, AssemblyIdentity)> {
    let (stable, display) = entry
        .split_once('=')
        .with_context(|| format!("expected STABLE=DISPLAY NAME, got '{entry}'"))?;
    let stable = stable.trim();
    anyhow::ensure!(!stable.is_empty(), "empty stable name in '{entry}'");

    let identity = AssemblyIdentity::parse(display.trim())
        .with_context(|| format!("invalid display name '{}'", display.trim()))?;
    Ok((stable.to_string(), identity))
}

fn build_mapping(opts: &RewriteOptions) -> anyhow::Result<RewriteMapping> {
    let mut live = Vec::with_capacity(opts.live.len());
    for path in opts.live {
        let identity = load_view(path)?
            .identity()
            .with_context(|| format!("no assembly manifest in {}", path.display()))?;
        live.push(identity);
    }

    let mut mapping = RewriteMapping::from_live(&live, opts.prefix);
    for entry in opts.map {
        let (stable, identity) = parse_map_entry(entry)?;
        if let Some(previous) = mapping.insert(stable.as_str(), identity) {
            log::warn!("--map {stable} overrides {previous}");
        }
    }

    Ok(mapping)
}

pub fn run(path: &Path, opts: &RewriteOptions) -> anyhow::Result<()> {
    let image =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mapping = build_mapping(opts)?;
    if mapping.is_empty() {
        log::warn!("nothing to map, the output is a copy of the input");
    }

    let before = AssemblyView::from_mem(image.clone())?.dependencies()?;
    let patched = MetadataRewriter::new()
        .with_prefix(opts.prefix)
        .with_verification(opts.verify)
        .rewrite(&image, &mapping)
        .with_context(|| format!("failed to rewrite {}", path.display()))?;
    fs::write(opts.output, &patched)
        .with_context(|| format!("failed to write {}", opts.output.display()))?;

    let after = AssemblyView::from_mem(patched.clone())?.dependencies()?;
    let retargeted = before
        .iter()
        .zip(&after)
        .filter(|(old, new)| old.full_name() != new.full_name())
        .map(|(old, new)| Retarget {
            rid: old.rid,
            from: old.full_name(),
            to: new.full_name(),
        })
        .collect();

    let result = RewriteOutput {
        output: opts.output.display().to_string(),
        size: patched.len(),
        mapped: mapping.len(),
        retargeted,
    };

    print_output(&result, opts.global, |result| {
        println!(
            "Wrote {} ({} bytes, {} mapping entries)",
            result.output, result.size, result.mapped
        );
        if result.retargeted.is_empty() {
            println!("No reference matched the mapping.");
            return;
        }

        let mut tw = TabWriter::new(vec![
            ("RID", Align::Right),
            ("From", Align::Left),
            ("To", Align::Left),
        ]);
        for retarget in &result.retargeted {
            tw.row(vec![
                retarget.rid.to_string(),
                retarget.from.clone(),
                retarget.to.clone(),
            ]);
        }
        tw.print();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_entries() {
        let (stable, identity) = parse_map_entry(
            "Combat=Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null",
        )
        .unwrap();
        assert_eq!(stable, "Combat");
        assert_eq!(identity.name, "Dynamic.Combat");
        assert_eq!(identity.version.major, 2);

        assert!(parse_map_entry("Combat").is_err());
        assert!(parse_map_entry("=Dynamic.Combat").is_err());
    }
}
