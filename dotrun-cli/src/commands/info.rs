//! `dotrun info` - print the types and methods of an assembly.

use std::path::Path;

use anyhow::Context;
use dotrun::CilImage;

pub fn run(path: &Path) -> anyhow::Result<()> {
    let image = CilImage::from_file(path)
        .with_context(|| format!("failed to load assembly '{}'", path.display()))?;

    println!("Assembly: {}", image.name());
    println!("Module:   {}", image.module_name());
    if !image.references().is_empty() {
        println!("References: {}", image.references().join(", "));
    }
    if let Some(entry) = image.entry_point() {
        println!("Entry point: {entry}");
    }
    println!();

    for ty in image.types() {
        if ty.name == "<Module>" {
            continue;
        }
        let kind = if ty.is_interface() { "interface" } else { "class" };
        println!("{kind} {}", ty.full_name());
        for field in &ty.fields {
            println!("    field  {} : {}", field.name, field.kind);
        }
        for method in &ty.methods {
            let marker = if method.rva == 0 { " (extern)" } else { "" };
            println!("    method {} {}{marker}", method.name, method.sig_string);
        }
    }

    Ok(())
}
