use ir_ocitool::{registry, Config, Extractor, ImageBuilder, ToolResult};
use log::info;
use std::path::{Path, PathBuf};

pub(crate) fn cmd_push(config: &Config, image: &str, files: &[PathBuf]) -> ToolResult<()>
{
    info!("Pushing {} file(s) to \"{}\"", files.len(), image);

    registry::push(&config.transport(), image, files, config)?;

    let names: Vec<_> = files.iter().map(|f| f.display().to_string()).collect();
    info!("Pushed {} with files: {}", image, names.join(", "));

    Ok(())
}

pub(crate) fn cmd_pull(config: &Config, image: &str, output: &Path) -> ToolResult<()>
{
    info!("Pulling \"{}\" into \"{}\"", image, output.display());

    let written = registry::pull(&config.transport(), image, output, config)?;

    info!("Pulled and extracted {} file(s) from {}", written, image);

    Ok(())
}

pub(crate) fn cmd_build(config: &Config, dir: &Path, files: &[PathBuf]) -> ToolResult<()>
{
    info!("Building image in \"{}\"", dir.display());

    let image = ImageBuilder::new(dir)
        .compression(config.compression)
        .build(files)?;

    info!("Manifest written: \"{}\"", image.manifest.display());

    Ok(())
}

pub(crate) fn cmd_extract(config: &Config, dir: &Path, output: &Path) -> ToolResult<()>
{
    info!(
        "Extracting image \"{}\" into \"{}\"",
        dir.display(),
        output.display()
    );

    let written = Extractor::new(dir).strict(config.strict).extract(output)?;

    info!("Extracted {} file(s)", written);

    Ok(())
}
