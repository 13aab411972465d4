use std::{
    env,
    fs::{self, File},
    io::{self, Write},
    path::Path,
    process::Command,
};

use log::{debug, info};

use crate::interpreter::ShellError;

pub fn is_alphanumeric(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Sorted names in the working directory, hidden entries left out.
pub fn my_ls(out: &mut impl Write) -> Result<(), ShellError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(".")? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    for name in names {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

pub fn my_mkdir(name: &str) -> Result<(), ShellError> {
    if !is_alphanumeric(name) {
        return Err(ShellError::BadMkdir);
    }
    fs::create_dir(name).map_err(|e| {
        debug!("mkdir {}: {}", name, e);
        ShellError::BadMkdir
    })
}

/// Creates `name`, emptying it if it exists.
pub fn my_touch(name: &str) -> Result<(), ShellError> {
    File::create(name)?;
    Ok(())
}

/// Only moves into a directory that is an entry of the current one.
pub fn my_cd(name: &str) -> Result<(), ShellError> {
    let is_entry = !name.contains('/') && Path::new(name).is_dir();
    if !is_entry {
        return Err(ShellError::BadCd);
    }
    env::set_current_dir(name).map_err(|e| {
        debug!("cd {}: {}", name, e);
        ShellError::BadCd
    })?;
    info!("Working directory is now {:?}", env::current_dir().ok());
    Ok(())
}

/// Runs a host program and waits for it. Its stdout is copied to `out`.
pub fn run(args: &[&str], out: &mut impl Write) -> Result<(), ShellError> {
    let Some((program, rest)) = args.split_first() else {
        return Err(ShellError::UnknownCommand);
    };
    out.flush()?;
    let output = Command::new(program)
        .args(rest)
        .output()
        .map_err(|e| ShellError::Run {
            program: program.to_string(),
            kind: e.kind(),
        })?;
    out.write_all(&output.stdout)?;
    io::stderr().write_all(&output.stderr)?;
    debug!("{} exited with {}", program, output.status);
    Ok(())
}
