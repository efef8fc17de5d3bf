use std::path::Path;

use anyhow::Context;
use dotboot::AssemblyView;

/// Open a .NET assembly for inspection.
pub fn load_view(path: &Path) -> anyhow::Result<AssemblyView> {
    AssemblyView::from_file(path)
        .with_context(|| format!("failed to load assembly: {}", path.display()))
}

/// `neutral` for an absent culture, as display names spell it.
pub fn culture_or_neutral(culture: Option<&str>) -> String {
    culture.unwrap_or("neutral").to_string()
}

/// Lowercase hex of a public key token, or `null`.
pub fn token_or_null(token: Option<[u8; 8]>) -> String {
    token.map_or_else(
        || "null".to_string(),
        |token| token.iter().map(|b| format!("{b:02x}")).collect(),
    )
}
