#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use seqring::RingBuffer;
use std::collections::HashSet;

const MAX_SPIN: usize = 64;

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Message {
    A,
    B,
    C,
    D,
}

fn encode(m: Message) -> [u8; 8] {
    let base = match m {
        Message::A => 0u8,
        Message::B => 8,
        Message::C => 16,
        Message::D => 24,
    };
    std::array::from_fn(|i| base + i as u8)
}

const ALL: [Message; 4] = [Message::A, Message::B, Message::C, Message::D];

fuzz_target!(|data: Vec<Message>| {
    let buffer: RingBuffer<8, 256> = RingBuffer::new();
    let mut writer = buffer.try_lock().unwrap();
    let reader = buffer.reader();

    let valid: HashSet<[u8; 8]> = ALL.iter().map(|&m| encode(m)).collect();

    std::thread::scope(|s| {
        let reader = &reader;
        let valid = &valid;

        for _ in 0..8 {
            s.spawn(move || loop {
                while let Some(m) = reader.pop_front() {
                    assert!(valid.contains(&m));
                }

                let mut counter = 0;
                while reader.pop_front().is_none() && counter < MAX_SPIN {
                    counter += 1;
                    std::thread::yield_now();
                }

                if counter < MAX_SPIN {
                    continue;
                }

                break;
            });
        }

        for window in data.windows(8) {
            for &message in window {
                writer.push_back(encode(message));
            }
            std::thread::yield_now();
        }
    })
});
