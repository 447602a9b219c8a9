use crate::abilities::grapple::GrapplePhase;
use crate::death::LifeState;
use crate::game::{ClientGame, Session};
use crate::world::{ArenaWorld, ProjectileKind, VisualKind, World, ARENA_RADIUS, BODY_RADIUS};
use macroquad::prelude::*;
use shared::{Vec3, MAX_CHARGE};

#[derive(Debug, Clone)]
pub struct HudInfo {
    pub fake_ping_ms: u64,
    pub dropped_snapshots: u64,
}

/// Top-down debug view of the arena
pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    fn scale(&self) -> f32 {
        self.width.min(self.height) / (ARENA_RADIUS * 2.4)
    }

    /// World x/z to screen pixels, +z pointing up the screen
    fn to_screen(&self, position: Vec3) -> (f32, f32) {
        let scale = self.scale();
        (
            self.width / 2.0 + position.x * scale,
            self.height / 2.0 - position.z * scale,
        )
    }

    pub fn render(&mut self, game: &ClientGame<ArenaWorld>, hud: &HudInfo) {
        self.width = screen_width();
        self.height = screen_height();
        clear_background(Color::from_rgba(26, 26, 26, 255));

        match game.session() {
            Session::InRoom { .. } => {
                self.draw_arena(game.world());
                self.draw_peers(game);
                self.draw_local(game);
                self.draw_hud(game, hud);
                self.draw_kill_banner(game);
                self.draw_death_overlay(game);
            }
            Session::Lobby => self.draw_lobby(game),
            Session::Connecting => {
                self.draw_centered("Connecting...", self.height / 2.0, 30.0, WHITE);
            }
            Session::Closed { reason } => {
                let text = format!("Disconnected: {}", reason);
                self.draw_centered(&text, self.height / 2.0, 30.0, RED);
            }
        }
    }

    fn draw_centered(&self, text: &str, y: f32, size: f32, color: Color) {
        let dims = measure_text(text, None, size as u16, 1.0);
        draw_text(text, (self.width - dims.width) / 2.0, y, size, color);
    }

    fn draw_arena(&self, world: &ArenaWorld) {
        let (cx, cy) = self.to_screen(Vec3::ZERO);
        let scale = self.scale();
        draw_circle(cx, cy, ARENA_RADIUS * scale, Color::from_rgba(68, 68, 68, 255));

        for block in world.blocks() {
            let (x, y) = self.to_screen(block.position);
            let side = block.half_extent * 2.0 * scale;
            let [_, r, g, b] = block.color.to_be_bytes();
            let color = Color::from_rgba(r, g, b, 255);
            draw_rectangle(x - side / 2.0, y - side / 2.0, side, side, color);
            draw_rectangle_lines(x - side / 2.0, y - side / 2.0, side, side, 1.0, WHITE);
        }

        for projectile in world.projectiles() {
            let (x, y) = self.to_screen(projectile.position);
            let color = match projectile.kind {
                ProjectileKind::Ball => ORANGE,
                ProjectileKind::Ultimate => Color::from_rgba(0, 200, 255, 255),
                ProjectileKind::Grenade => DARKGREEN,
            };
            draw_circle(x, y, (projectile.size * scale).max(2.0), color);
        }

        for visual in world.visuals() {
            let (x, y) = self.to_screen(visual.position);
            match visual.kind {
                VisualKind::UltimateCharge => {
                    draw_circle_lines(x, y, visual.scale * scale, 2.0, SKYBLUE)
                }
                VisualKind::GrenadeCharge => {
                    draw_circle_lines(x, y, visual.scale * scale, 2.0, GREEN)
                }
                VisualKind::Bat => draw_circle(x, y, 3.0, BROWN),
                VisualKind::GrappleHook => draw_circle(x, y, 4.0, YELLOW),
                VisualKind::Explosion => {
                    draw_circle_lines(x, y, visual.scale * 8.0 * scale, 3.0, RED)
                }
            }
        }
    }

    fn draw_peers(&self, game: &ClientGame<ArenaWorld>) {
        let scale = self.scale();
        for replica in game.replicas().iter().filter(|r| r.visible) {
            let (x, y) = self.to_screen(replica.position);
            draw_circle(x, y, BODY_RADIUS * scale, Color::from_rgba(255, 68, 68, 255));

            let facing = replica.position + Vec3::from_yaw_pitch(replica.rotation, 0.0);
            let (fx, fy) = self.to_screen(facing);
            draw_line(x, y, fx, fy, 2.0, WHITE);

            if let Some(anchor) = replica.grapple_anchor {
                let (ax, ay) = self.to_screen(anchor);
                draw_line(x, y, ax, ay, 1.0, YELLOW);
            }

            draw_text(&replica.username, x + 8.0, y - 8.0, 16.0, WHITE);
        }
    }

    fn draw_local(&self, game: &ClientGame<ArenaWorld>) {
        if game.deaths().is_dead() {
            return;
        }

        let world = game.world();
        let body = world.body_position();
        let (x, y) = self.to_screen(body);
        draw_circle(x, y, BODY_RADIUS * self.scale(), GREEN);

        let (fx, fy) = self.to_screen(body + game.aim() * 2.0);
        draw_line(x, y, fx, fy, 2.0, YELLOW);

        if let GrapplePhase::Attached { anchor } = game.abilities().grapple.phase() {
            let (ax, ay) = self.to_screen(anchor);
            draw_line(x, y, ax, ay, 1.5, YELLOW);
        }
    }

    fn draw_hud(&self, game: &ClientGame<ArenaWorld>, hud: &HudInfo) {
        let room = game.room_name().unwrap_or("?");
        let mut header = format!("{} @ {}", game.username(), room);
        if let Some(code) = game.room_code() {
            header.push_str(&format!("  [code {}]", code));
        }
        draw_text(&header, 10.0, 20.0, 20.0, WHITE);
        draw_text(
            &format!(
                "{} peers  {}ms fake ping  {} snapshots dropped",
                game.replicas().len(),
                hud.fake_ping_ms,
                hud.dropped_snapshots
            ),
            10.0,
            40.0,
            16.0,
            GRAY,
        );

        let (ultimate, grenade) = game.abilities().charge_levels();
        self.draw_charge_bar("ULT", ultimate, 60.0, SKYBLUE);
        self.draw_charge_bar("GRN", grenade, 80.0, GREEN);

        let cooldowns = [
            ("BAT", game.abilities().bat.on_cooldown()),
            ("HOOK", game.abilities().grapple.on_cooldown()),
        ];
        for (i, (label, cooling)) in cooldowns.iter().enumerate() {
            let color = if *cooling { RED } else { GREEN };
            let x = 10.0 + i as f32 * 60.0;
            draw_rectangle(x, 96.0, 10.0, 10.0, color);
            draw_text(label, x + 14.0, 106.0, 14.0, WHITE);
        }

        draw_text(
            "WASD move  arrows/mouse look  X ult  Q grenade  F bat  E hook  LMB shoot  RMB build  K clear",
            10.0,
            self.height - 10.0,
            14.0,
            GRAY,
        );
    }

    fn draw_charge_bar(&self, label: &str, charge: f32, y: f32, color: Color) {
        let width = 120.0;
        draw_text(label, 10.0, y + 10.0, 14.0, WHITE);
        draw_rectangle(45.0, y, width, 10.0, Color::from_rgba(51, 51, 51, 255));
        draw_rectangle(45.0, y, width * (charge / MAX_CHARGE).clamp(0.0, 1.0), 10.0, color);
    }

    fn draw_kill_banner(&self, game: &ClientGame<ArenaWorld>) {
        if let Some(banner) = game.kill_banner() {
            self.draw_centered(
                &format!("Eliminated {}", banner.victim_name),
                80.0,
                32.0,
                GOLD,
            );
        }
    }

    fn draw_death_overlay(&self, game: &ClientGame<ArenaWorld>) {
        let LifeState::Dead { seconds_left } = game.deaths().state() else {
            return;
        };

        draw_rectangle(0.0, 0.0, self.width, self.height, Color::from_rgba(0, 0, 0, 160));
        self.draw_centered("YOU DIED", self.height / 2.0 - 30.0, 48.0, RED);
        if let Some(death) = game.deaths().last_death() {
            self.draw_centered(&death.cause, self.height / 2.0 + 10.0, 24.0, WHITE);
        }
        self.draw_centered(
            &format!("Respawning in {}", seconds_left),
            self.height / 2.0 + 40.0,
            24.0,
            GRAY,
        );
    }

    fn draw_lobby(&self, game: &ClientGame<ArenaWorld>) {
        draw_text("Lobby", 20.0, 40.0, 32.0, WHITE);
        if let Some(error) = game.last_error() {
            draw_text(error, 20.0, 70.0, 20.0, RED);
        }

        for (i, room) in game.available_rooms().iter().enumerate() {
            let line = format!(
                "{}. {}  ({}/{})",
                i + 1,
                room.name,
                room.player_count,
                room.capacity
            );
            draw_text(&line, 20.0, 110.0 + i as f32 * 24.0, 20.0, WHITE);
        }

        draw_text(
            "Press 1-9 to join a room",
            20.0,
            self.height - 20.0,
            16.0,
            GRAY,
        );
    }
}
