// Frame loop - poll events, draw, repeat until the window asks to close
//
// Single-threaded. The close flag is checked after every poll, so a close
// request stops the loop before another frame is presented.

use crate::backend::error::Result;

/// Window-system side of the loop
pub trait EventPump {
    /// Handle pending events without blocking
    fn poll_events(&mut self);
    fn should_close(&self) -> bool;
}

/// Renderer side of the loop
pub trait FrameSink {
    /// Acquire, record, submit and present one frame
    fn draw_frame(&mut self) -> Result<()>;
}

/// Returns the number of frames presented
pub fn run<P, S>(pump: &mut P, sink: &mut S) -> Result<u64>
where
    P: EventPump,
    S: FrameSink,
{
    let mut frames = 0u64;

    while !pump.should_close() {
        pump.poll_events();
        if pump.should_close() {
            break;
        }
        sink.draw_frame()?;
        frames += 1;
    }

    log::info!("Frame loop finished after {} frames", frames);
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RenderError;
    use ash::vk;

    /// Requests close during the `close_on`-th poll
    struct ScriptedPump {
        polls: u32,
        close_on: u32,
        closed: bool,
    }

    impl ScriptedPump {
        fn closing_on(close_on: u32) -> Self {
            Self {
                polls: 0,
                close_on,
                closed: false,
            }
        }
    }

    impl EventPump for ScriptedPump {
        fn poll_events(&mut self) {
            self.polls += 1;
            if self.polls == self.close_on {
                self.closed = true;
            }
        }

        fn should_close(&self) -> bool {
            self.closed
        }
    }

    #[derive(Default)]
    struct CountingSink {
        presents: u64,
        fail_on: Option<u64>,
    }

    impl FrameSink for CountingSink {
        fn draw_frame(&mut self) -> Result<()> {
            if self.fail_on == Some(self.presents + 1) {
                return Err(RenderError::Present(vk::Result::ERROR_DEVICE_LOST));
            }
            self.presents += 1;
            Ok(())
        }
    }

    #[test]
    fn close_mid_loop_stops_before_next_present() {
        let mut pump = ScriptedPump::closing_on(4);
        let mut sink = CountingSink::default();

        let frames = run(&mut pump, &mut sink).unwrap();

        assert_eq!(frames, 3);
        assert_eq!(sink.presents, 3);
        assert_eq!(pump.polls, 4);
    }

    #[test]
    fn already_closed_window_presents_nothing() {
        let mut pump = ScriptedPump::closing_on(0);
        pump.closed = true;
        let mut sink = CountingSink::default();

        assert_eq!(run(&mut pump, &mut sink).unwrap(), 0);
        assert_eq!(pump.polls, 0);
        assert_eq!(sink.presents, 0);
    }

    #[test]
    fn frame_error_aborts_the_loop() {
        let mut pump = ScriptedPump::closing_on(100);
        let mut sink = CountingSink {
            fail_on: Some(2),
            ..Default::default()
        };

        let result = run(&mut pump, &mut sink);

        assert!(matches!(result, Err(RenderError::Present(_))));
        assert_eq!(sink.presents, 1);
        assert_eq!(pump.polls, 2);
    }
}
