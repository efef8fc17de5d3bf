use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{culture_or_neutral, load_view, token_or_null},
    output::print_output,
};

#[derive(Debug, Serialize)]
struct IdentityInfo {
    full_name: String,
    name: String,
    version: String,
    culture: String,
    public_key_token: String,
    strong_named: bool,
    reference_count: usize,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let view = load_view(path)?;
    let identity = view
        .identity()
        .with_context(|| format!("no assembly manifest in {}", path.display()))?;
    let references = view.dependencies()?;

    let info = IdentityInfo {
        full_name: identity.full_name(),
        name: identity.name.clone(),
        version: identity.version.to_string(),
        culture: culture_or_neutral(identity.culture.as_deref()),
        public_key_token: token_or_null(identity.public_key_token()),
        strong_named: identity.is_strong_named(),
        reference_count: references.len(),
    };

    print_output(&info, opts, |info| {
        println!("{}", info.full_name);
        println!("  Name:           {}", info.name);
        println!("  Version:        {}", info.version);
        println!("  Culture:        {}", info.culture);
        println!("  PublicKeyToken: {}", info.public_key_token);
        println!("  Strong named:   {}", if info.strong_named { "yes" } else { "no" });
        println!("  References:     {}", info.reference_count);
    })
}
