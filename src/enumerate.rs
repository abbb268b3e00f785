use std::io::Write;
use std::path::PathBuf;

use vamphost::plugin::{PluginMetadata, SampleType};
use vamphost::{PluginLoader, list_libraries};

pub fn paths(out: &mut impl Write, paths: &[PathBuf]) -> anyhow::Result<()> {
    writeln!(out, "=== Plugin Search Path ===")?;
    if paths.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for path in paths {
        let marker = if path.is_dir() { "" } else { "  (missing)" };
        writeln!(out, "  {}{marker}", path.display())?;
    }
    Ok(())
}

pub fn libraries(out: &mut impl Write, loader: &PluginLoader) -> anyhow::Result<()> {
    writeln!(out, "=== Plugin Libraries ===")?;
    for library in loader.libraries() {
        let location = library
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".into());
        writeln!(
            out,
            "  {}  {location}  ({} plugins)",
            library.name(),
            library.plugin_count()
        )?;
    }
    let found = list_libraries(loader.paths());
    if found.is_empty() {
        writeln!(out, "  (no plugin libraries found on the search path)")?;
    }
    Ok(())
}

pub fn plugins(out: &mut impl Write, loader: &PluginLoader) -> anyhow::Result<()> {
    writeln!(out, "=== Plugins ===")?;
    let mut count = 0;
    for library in loader.libraries() {
        for (key, descriptor) in library.plugin_keys().iter().zip(library.list_plugins()) {
            writeln!(out, "  {key}")?;
            writeln!(out, "          Name:    {}", descriptor.name)?;
            writeln!(out, "          Input:   {}", descriptor.input_domain.as_str())?;
            writeln!(out, "          Params:  {}", descriptor.parameters.len())?;
            writeln!(out, "          Programs: {}", descriptor.programs.len())?;
            count += 1;
        }
    }
    if count == 0 {
        writeln!(out, "  (none found)")?;
    }
    Ok(())
}

fn sample_type(sample_type: SampleType) -> String {
    match sample_type {
        SampleType::OneSamplePerStep => "one sample per step".into(),
        SampleType::FixedSampleRate(rate) => format!("fixed rate {rate} Hz"),
        SampleType::VariableSampleRate(rate) => format!("variable rate ({rate} Hz resolution)"),
    }
}

pub fn describe(out: &mut impl Write, metadata: &PluginMetadata) -> anyhow::Result<()> {
    let d = &metadata.descriptor;
    writeln!(out, "{} ({})", d.name, metadata.key)?;
    if !d.description.is_empty() {
        writeln!(out, "  {}", d.description)?;
    }
    writeln!(out, "  Maker:         {}", d.maker)?;
    writeln!(out, "  Copyright:     {}", d.copyright)?;
    writeln!(out, "  Version:       {} (Vamp API {})", d.plugin_version, d.vamp_api_version)?;
    writeln!(out, "  Input domain:  {}", d.input_domain.as_str())?;

    let preferred = |size: Option<usize>| size.map_or("(none)".to_string(), |s| s.to_string());
    writeln!(out, "  Block size:    {}", preferred(metadata.preferred_block_size))?;
    writeln!(out, "  Step size:     {}", preferred(metadata.preferred_step_size))?;

    writeln!(out, "  Parameters:    {}", d.parameters.len())?;
    for param in &d.parameters {
        write!(
            out,
            "    {} \"{}\" (min={}, max={}, default={}",
            param.identifier, param.name, param.min_value, param.max_value, param.default_value
        )?;
        if !param.unit.is_empty() {
            write!(out, ", unit={}", param.unit)?;
        }
        if let Some(step) = param.quantize_step {
            write!(out, ", step={step}")?;
        }
        writeln!(out, ")")?;
        if !param.value_names.is_empty() {
            writeln!(out, "      values: {}", param.value_names.join(", "))?;
        }
    }

    if d.programs.is_empty() {
        writeln!(out, "  Programs:      (none)")?;
    } else {
        writeln!(out, "  Programs:      {}", d.programs.join(", "))?;
    }

    writeln!(out, "  Outputs:       {}", metadata.outputs.len())?;
    for output in &metadata.outputs {
        write!(out, "    {} \"{}\"", output.identifier, output.name)?;
        if !output.unit.is_empty() {
            write!(out, " [{}]", output.unit)?;
        }
        writeln!(out)?;
        match output.bin_count {
            Some(bins) => writeln!(out, "      bins:   {bins}")?,
            None => writeln!(out, "      bins:   variable")?,
        }
        if !output.bin_names.is_empty() {
            writeln!(out, "      names:  {}", output.bin_names.join(", "))?;
        }
        if let Some((min, max)) = output.extents {
            writeln!(out, "      range:  {min} .. {max}")?;
        }
        writeln!(out, "      timing: {}", sample_type(output.sample_type))?;
    }
    Ok(())
}
