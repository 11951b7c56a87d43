//! Recording lines for unit tests

use crate::error::{Error, Result};
use crate::line::{ClockLine, Delay, DigitalLine, Direction};
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Level(u32, bool),
    Direction(u32, Direction),
    ClockStart(u32),
    ClockStop,
}

#[derive(Default)]
pub struct Bench {
    pub events: Vec<Event>,
    pub levels: [bool; 16],
    pub failing: Option<u32>,
    pub clock_running: Option<u32>,
    pub elapsed_ns: u64,
}

#[derive(Clone, Default)]
pub struct Shared(pub Rc<RefCell<Bench>>);

impl Shared {
    pub fn line(&self, id: u32) -> MockLine {
        MockLine {
            id,
            bench: self.clone(),
        }
    }

    pub fn clock(&self) -> MockClock {
        MockClock {
            bench: self.clone(),
        }
    }

    pub fn delay(&self) -> MockDelay {
        MockDelay {
            bench: self.clone(),
        }
    }

    pub fn set_input(&self, id: u32, high: bool) {
        self.0.borrow_mut().levels[id as usize] = high;
    }

    pub fn fail_line(&self, id: u32) {
        self.0.borrow_mut().failing = Some(id);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn level(&self, id: u32) -> bool {
        self.0.borrow().levels[id as usize]
    }

    pub fn clock_running(&self) -> Option<u32> {
        self.0.borrow().clock_running
    }

    pub fn position(&self, event: Event) -> Option<usize> {
        self.0.borrow().events.iter().position(|e| *e == event)
    }
}

pub struct MockLine {
    id: u32,
    bench: Shared,
}

impl DigitalLine for MockLine {
    fn id(&self) -> u32 {
        self.id
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let mut bench = self.bench.0.borrow_mut();
        if bench.failing == Some(self.id) {
            return Err(Error::LineFault);
        }
        bench.events.push(Event::Direction(self.id, direction));
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> Result<()> {
        let mut bench = self.bench.0.borrow_mut();
        if bench.failing == Some(self.id) {
            return Err(Error::LineFault);
        }
        bench.events.push(Event::Level(self.id, high));
        bench.levels[self.id as usize] = high;
        Ok(())
    }

    fn level(&mut self) -> Result<bool> {
        Ok(self.bench.0.borrow().levels[self.id as usize])
    }
}

pub struct MockClock {
    bench: Shared,
}

impl ClockLine for MockClock {
    fn id(&self) -> u32 {
        15
    }

    fn start_clock(&mut self, frequency_khz: u32) -> Result<()> {
        let mut bench = self.bench.0.borrow_mut();
        bench.events.push(Event::ClockStart(frequency_khz));
        bench.clock_running = Some(frequency_khz);
        Ok(())
    }

    fn stop_clock(&mut self) -> Result<()> {
        let mut bench = self.bench.0.borrow_mut();
        bench.events.push(Event::ClockStop);
        bench.clock_running = None;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockDelay {
    bench: Shared,
}

impl Delay for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.bench.0.borrow_mut().elapsed_ns += ns as u64;
    }
}
