// src/actions/info.rs

//! Informational actions. None of them change state.

use std::path::Path;

use super::{ActionContext, Target};
use crate::errors::Result;
use crate::fs::read_lines;
use crate::project::StageInput;

pub fn dump_project(t: Target<'_>) -> Result<usize> {
    println!("{:#?}", t.project);
    Ok(0)
}

pub fn dump_stage(t: Target<'_>) -> Result<usize> {
    println!("{:#?}", t.stage);
    Ok(0)
}

pub fn print_dir(dir: &Path) -> Result<usize> {
    println!("{}", dir.display());
    Ok(0)
}

pub fn print_defname(t: Target<'_>) -> Result<usize> {
    if let Some(defname) = &t.stage.defname {
        println!("{defname}");
    }
    Ok(0)
}

/// Print the input files of the stage, one per line.
pub async fn input_files(ctx: &ActionContext, t: Target<'_>) -> Result<usize> {
    match &t.stage.input {
        StageInput::File(path) => println!("{}", path.display()),
        StageInput::List(path) => {
            for line in read_lines(ctx.fs.as_ref(), path)? {
                println!("{line}");
            }
        }
        StageInput::Dataset(def) => {
            for name in ctx.catalog.list_files(&format!("defname: {def}")).await? {
                println!("{name}");
            }
        }
        StageInput::Generator => {}
    }
    Ok(0)
}
