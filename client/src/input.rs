//! Keyboard and mouse sampling with edge detection into [`InputCommand`]s

use crate::game::InputCommand;
use macroquad::prelude::*;

/// Look speed for the arrow keys, radians per second
pub const KEY_LOOK_SPEED: f32 = 2.5;
pub const MOUSE_SENSITIVITY: f32 = 3.0;

/// Raw control state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KeySample {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub ultimate: bool,
    pub grenade: bool,
    pub bat: bool,
    pub grapple: bool,
    pub shoot: bool,
    pub build: bool,
    pub clear: bool,
    pub look_left: bool,
    pub look_right: bool,
    pub look_up: bool,
    pub look_down: bool,
    pub mouse_delta: (f32, f32),
}

impl KeySample {
    pub fn capture() -> Self {
        let mouse = mouse_delta_position();
        Self {
            forward: is_key_down(KeyCode::W),
            back: is_key_down(KeyCode::S),
            left: is_key_down(KeyCode::A),
            right: is_key_down(KeyCode::D),
            jump: is_key_down(KeyCode::Space),
            ultimate: is_key_down(KeyCode::X),
            grenade: is_key_down(KeyCode::Q),
            bat: is_key_down(KeyCode::F),
            grapple: is_key_down(KeyCode::E),
            shoot: is_mouse_button_down(MouseButton::Left),
            build: is_mouse_button_down(MouseButton::Right),
            clear: is_key_down(KeyCode::K),
            look_left: is_key_down(KeyCode::Left),
            look_right: is_key_down(KeyCode::Right),
            look_up: is_key_down(KeyCode::Up),
            look_down: is_key_down(KeyCode::Down),
            mouse_delta: (mouse.x, mouse.y),
        }
    }

    fn move_axes(&self) -> (f32, f32) {
        let axis = |pos: bool, neg: bool| match (pos, neg) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        };
        (axis(self.forward, self.back), axis(self.right, self.left))
    }
}

/// Turns successive key samples into commands
#[derive(Debug, Default)]
pub struct InputManager {
    prev: KeySample,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the devices for this frame
    pub fn update(&mut self) -> Vec<InputCommand> {
        self.process(KeySample::capture(), get_frame_time())
    }

    pub fn process(&mut self, sample: KeySample, dt: f32) -> Vec<InputCommand> {
        let prev = self.prev;
        let mut commands = Vec::new();

        let (forward, strafe) = sample.move_axes();
        if (forward, strafe) != prev.move_axes() {
            commands.push(InputCommand::Move { forward, strafe });
        }

        let mut yaw_delta = -sample.mouse_delta.0 * MOUSE_SENSITIVITY;
        let mut pitch_delta = sample.mouse_delta.1 * MOUSE_SENSITIVITY;
        if sample.look_left {
            yaw_delta += KEY_LOOK_SPEED * dt;
        }
        if sample.look_right {
            yaw_delta -= KEY_LOOK_SPEED * dt;
        }
        if sample.look_up {
            pitch_delta += KEY_LOOK_SPEED * dt;
        }
        if sample.look_down {
            pitch_delta -= KEY_LOOK_SPEED * dt;
        }
        if yaw_delta != 0.0 || pitch_delta != 0.0 {
            commands.push(InputCommand::Look {
                yaw_delta,
                pitch_delta,
            });
        }

        // Held abilities report both edges, one-shot actions only the press
        let held = [
            (prev.ultimate, sample.ultimate, InputCommand::UltimatePressed, InputCommand::UltimateReleased),
            (prev.grenade, sample.grenade, InputCommand::GrenadePressed, InputCommand::GrenadeReleased),
            (prev.grapple, sample.grapple, InputCommand::GrapplePressed, InputCommand::GrappleReleased),
        ];
        for (was, is, pressed, released) in held {
            match (was, is) {
                (false, true) => commands.push(pressed),
                (true, false) => commands.push(released),
                _ => {}
            }
        }

        let taps = [
            (prev.jump, sample.jump, InputCommand::Jump),
            (prev.bat, sample.bat, InputCommand::SwingBat),
            (prev.shoot, sample.shoot, InputCommand::ShootBall),
            (prev.build, sample.build, InputCommand::BuildBlock),
            (prev.clear, sample.clear, InputCommand::ClearBlocks),
        ];
        commands.extend(
            taps.into_iter()
                .filter(|(was, is, _)| !was && *is)
                .map(|(_, _, command)| command),
        );

        self.prev = sample;
        commands
    }
}
