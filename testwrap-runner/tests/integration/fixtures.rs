// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use color_eyre::eyre::Result;
use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};
use testwrap_runner::{
    output::ConsoleStreams,
    runner::{RunFinished, SupervisorBuilder},
    signal::SignalHandlerKind,
};

pub(crate) static FAKE_TEST_BINARY: &str = env!("CARGO_BIN_EXE_fake-test-binary");

pub(crate) static FAKE_PACKAGE: &str = "example.com/fake";

/// An in-memory console that can be inspected after the run.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Console {
    pub(crate) stdout: SharedBuf,
    pub(crate) stderr: SharedBuf,
}

/// Returns a builder whose console output is captured into the returned [`Console`].
pub(crate) fn captured_builder() -> (SupervisorBuilder, Console) {
    let console = Console::default();
    let mut builder = SupervisorBuilder::default();
    builder
        .set_console(ConsoleStreams::new(
            console.stdout.clone(),
            console.stderr.clone(),
        ))
        .set_leak_timeout(Duration::from_secs(2));
    (builder, console)
}

pub(crate) fn run_fake(builder: SupervisorBuilder, args: &[&str]) -> Result<RunFinished> {
    let supervisor = builder.build(FAKE_PACKAGE, SignalHandlerKind::Noop)?;
    Ok(supervisor.run(FAKE_TEST_BINARY, args)?)
}
