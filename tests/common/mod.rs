#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use collabvis::protocol::{Message, MessageType, Router};
use parking_lot::Mutex;
use std::sync::Arc;

/// Writes server messages the way the server lays them out.
#[derive(Default)]
pub struct StreamWriter {
    buf: Vec<u8>,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, ty: MessageType) -> &mut Self {
        self.short(ty as i16)
    }

    pub fn short(&mut self, v: i16) -> &mut Self {
        self.buf.write_i16::<BigEndian>(v).unwrap();
        self
    }

    pub fn int(&mut self, v: i32) -> &mut Self {
        self.buf.write_i32::<BigEndian>(v).unwrap();
        self
    }

    pub fn float(&mut self, v: f32) -> &mut Self {
        self.buf.write_f32::<BigEndian>(v).unwrap();
        self
    }

    pub fn byte(&mut self, v: u8) -> &mut Self {
        self.buf.write_u8(v).unwrap();
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.int(data.len() as i32);
        self.buf.extend_from_slice(data);
        self
    }

    /// Gaussian-family payload: type, color mode, alpha max, properties.
    pub fn gaussian_tf(&mut self, kind: u8, color_mode: i32, alpha_max: f32, props: &[(i32, f32, f32)]) -> &mut Self {
        self.byte(kind).int(color_mode).float(alpha_max).int(props.len() as i32);
        for &(id, center, scale) in props {
            self.int(id).float(center).float(scale);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Router whose dispatched messages are collected in order.
pub fn collecting_router() -> (Router, Arc<Mutex<Vec<Message>>>) {
    let router = Router::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    router.add_listener(Arc::new(move |m: &Message| sink.lock().push(m.clone())));
    (router, seen)
}
