use std::sync::Arc;

use amiro_protocol::Message;

use crate::dispatch::FrameHandler;
use crate::error::DriverError;
use crate::peripherals::LightDriver;
use crate::transmitter::Transmitter;

/// LED 灯环板：没有周期广播，只执行灯光命令
pub struct LightRing {
    lights: Arc<dyn LightDriver>,
}

impl LightRing {
    pub fn new(lights: Arc<dyn LightDriver>) -> Self {
        Self { lights }
    }
}

impl FrameHandler for LightRing {
    fn handle_command(&self, command: &Message, _tx: &Transmitter) -> Result<bool, DriverError> {
        match *command {
            Message::LightColor { index, color } => self.lights.set_color(index, color)?,
            Message::LightBrightness(percent) => self.lights.set_brightness(percent)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl std::fmt::Debug for LightRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightRing").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::metrics::NodeMetrics;
    use crate::sim::SimLights;
    use amiro_can::{LoopbackBus, SplittableAdapter};
    use amiro_protocol::{BoardId, Color, FrameCodec, KinematicVelocity};
    use std::time::Duration;

    #[test]
    fn test_light_commands() {
        let bus = LoopbackBus::new();
        let (_rx, tx) = bus.attach().split().unwrap();
        let tx = Transmitter::new(
            tx,
            FrameCodec::default(),
            BoardId::LIGHT_RING,
            TopologyConfig::default(),
            Duration::from_millis(5),
            Arc::new(NodeMetrics::new()),
        );
        let lights = Arc::new(SimLights::new());
        let board = LightRing::new(lights.clone());

        let color = Message::LightColor {
            index: 6,
            color: Color::GREEN,
        };
        assert!(board.handle_command(&color, &tx).unwrap());
        assert!(board.handle_command(&Message::LightBrightness(25), &tx).unwrap());
        assert!(!board
            .handle_command(&Message::TargetSpeed(KinematicVelocity::default()), &tx)
            .unwrap());

        assert_eq!(lights.colors()[6], Color::GREEN);
        assert_eq!(lights.colors()[0], Color::BLACK);
        assert_eq!(lights.brightness(), 25);
    }
}
