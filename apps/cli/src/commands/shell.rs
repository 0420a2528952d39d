//! 远程 shell：控制台输入逐行转发给目标板，目标板输出写到 stdout

use std::io::{BufRead, Write};
use std::time::Duration;

use amiro_driver::{Console, NodeBuilder, ShutdownSupervisor};
use amiro_protocol::BoardId;
use anyhow::{Result, bail};
use clap::Args;
use tracing::{info, warn};

use crate::connection::{GlobalArgs, install_ctrlc};

#[derive(Args, Debug)]
pub struct ShellCommand {
    /// 目标板卡 ID
    pub target: u8,
}

struct StdoutConsole;

impl Console for StdoutConsole {
    fn write(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }
}

impl ShellCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let target = BoardId(self.target);
        if target.is_broadcast() {
            bail!("shell target must be a board id, not broadcast");
        }

        let supervisor = ShutdownSupervisor::new();
        let node = global.start(
            NodeBuilder::default()
                .console(Box::new(StdoutConsole))
                .shutdown_signal(supervisor.signal()),
        )?;
        if node.board() == target {
            bail!("{} is this node, pick a remote board", target);
        }
        install_ctrlc(supervisor.signal())?;

        let shell = node.shell().clone();
        shell.switch_to(target);
        info!("Shell attached to {} (Ctrl-C or EOF to leave)", target);

        let signal = supervisor.signal();
        std::thread::Builder::new()
            .name("amiro-cli-stdin".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(mut line) = line else { break };
                    line.push('\n');
                    if let Err(e) = shell.input(line.as_bytes()) {
                        warn!("Shell: failed to forward input: {}", e);
                    }
                }
                signal.request();
            })?;

        while !supervisor.wait(Duration::from_millis(200)) {
            if !node.is_running() {
                bail!("CAN receive thread stopped");
            }
        }
        // 给最后一批输出留出到达时间
        std::thread::sleep(Duration::from_millis(100));
        node.shell().switch_to(node.board());
        Ok(())
    }
}
