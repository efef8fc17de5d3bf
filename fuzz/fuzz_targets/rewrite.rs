#![no_main]

use libfuzzer_sys::fuzz_target;
use dotboot::{
    rewrite::{MetadataRewriter, ReferenceRewriter, RewriteMapping},
    AssemblyIdentity, AssemblyView,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(view) = AssemblyView::from_mem(data.to_vec()) {
        let _ = view.identity();
        let _ = view.dependencies();
    }

    let mut mapping = RewriteMapping::new();
    if let Ok(live) = AssemblyIdentity::parse("Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null") {
        mapping.insert("Combat", live);
    }
    let _ = MetadataRewriter::new().rewrite(data, &mapping);
});
