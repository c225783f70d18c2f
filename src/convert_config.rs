use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::{
    export::ExportTarget,
    flatten::{FlattenOptions, VerticalAxis},
};

pub const USAGE: &str =
    "usage: tris-baker <input-file> [rotation-angle] [--up y|z] [--snapshot] [--materials]";

#[derive(Clone, Debug, PartialEq)]
pub struct ConvertConfig {
    /// A glTF file, or a `.scene` snapshot.
    pub input: PathBuf,
    /// Radians about the vertical axis.
    pub rotation: f32,
    pub vertical_axis: VerticalAxis,
    pub write_snapshot: bool,
    pub write_materials: bool,
}

impl ConvertConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            rotation: 0.0,
            vertical_axis: VerticalAxis::default(),
            write_snapshot: false,
            write_materials: false,
        }
    }

    /// Parses the command line, without the program name.
    pub fn from_args<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut input = None;
        let mut rotation = None;
        let mut vertical_axis = VerticalAxis::default();
        let mut write_snapshot = false;
        let mut write_materials = false;

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--snapshot" => write_snapshot = true,
                "--materials" => write_materials = true,
                "--up" => {
                    let axis = args.next().context("--up expects y or z")?;
                    vertical_axis = match axis.to_ascii_lowercase().as_str() {
                        "y" => VerticalAxis::Y,
                        "z" => VerticalAxis::Z,
                        other => bail!("Unknown vertical axis {:?}, expected y or z", other),
                    };
                }
                flag if flag.starts_with("--") => bail!("Unknown option {}\n{}", flag, USAGE),
                _ if input.is_none() => input = Some(PathBuf::from(&arg)),
                _ if rotation.is_none() => {
                    rotation = Some(
                        arg.parse::<f32>()
                            .with_context(|| format!("Invalid rotation angle {:?}", arg))?,
                    );
                }
                _ => bail!("Unexpected argument {:?}\n{}", arg, USAGE),
            }
        }

        let Some(input) = input else {
            bail!("Missing input file\n{}", USAGE);
        };
        Ok(Self {
            input,
            rotation: rotation.unwrap_or(0.0),
            vertical_axis,
            write_snapshot,
            write_materials,
        })
    }

    /// Sibling of the input with the same base name.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.input.with_extension(extension)
    }

    pub fn flatten_options(&self) -> FlattenOptions {
        FlattenOptions {
            merge: true,
            vertical_axis: self.vertical_axis,
            rotation: self.rotation,
        }
    }

    pub fn export_targets(&self) -> &'static [ExportTarget] {
        &ExportTarget::ALL
    }

    pub fn is_snapshot_input(&self) -> bool {
        self.input
            .extension()
            .map_or(false, |extension| extension == "scene")
    }
}
