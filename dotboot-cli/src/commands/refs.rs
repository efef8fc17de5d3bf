use std::path::Path;

use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{culture_or_neutral, load_view, token_or_null},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct ReferenceInfo {
    rid: u32,
    name: String,
    version: String,
    culture: String,
    public_key_token: String,
    flags: String,
    full_name: String,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let view = load_view(path)?;

    let references: Vec<ReferenceInfo> = view
        .dependencies()?
        .into_iter()
        .map(|dependency| ReferenceInfo {
            rid: dependency.rid,
            full_name: dependency.full_name(),
            name: dependency.identity.name.clone(),
            version: dependency.identity.version.to_string(),
            culture: culture_or_neutral(dependency.identity.culture.as_deref()),
            public_key_token: token_or_null(dependency.identity.public_key_token()),
            flags: format!("{:#x}", dependency.flags.bits()),
        })
        .collect();

    print_output(&references, opts, |references| {
        if references.is_empty() {
            println!("No assembly references.");
            return;
        }

        println!("Assembly references ({} entries):", references.len());
        let mut tw = TabWriter::new(vec![
            ("RID", Align::Right),
            ("Name", Align::Left),
            ("Version", Align::Left),
            ("Culture", Align::Left),
            ("PublicKeyToken", Align::Left),
            ("Flags", Align::Right),
        ]);
        for reference in references {
            tw.row(vec![
                reference.rid.to_string(),
                reference.name.clone(),
                reference.version.clone(),
                reference.culture.clone(),
                reference.public_key_token.clone(),
                reference.flags.clone(),
            ]);
        }
        tw.print();
    })
}
