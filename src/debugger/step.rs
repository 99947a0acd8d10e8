use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::debugee::tracer::StopReason;
use crate::debugger::error::Error;
use crate::debugger::Debugger;
use gimli::Range;

impl Debugger {
    /// Move the tracee to the next instruction, stepping over a breakpoint
    /// if the current instruction hosts one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ProcessExit`] if the tracee exits during the step.
    pub(super) fn single_step_instruction(&mut self) -> Result<(), Error> {
        let pc = self.debugee.tracee().pc()?;
        if self.breakpoints.enabled_at(pc) {
            self.step_over_breakpoint()
        } else {
            let reason = self.debugee.single_step()?;
            self.check_for_exit(reason)
        }
    }

    /// If the tracee is stopped at a breakpoint, disable it, execute the
    /// hosted instruction and re-enable the breakpoint afterwards.
    pub(super) fn step_over_breakpoint(&mut self) -> Result<(), Error> {
        let pc = self.debugee.tracee().pc()?;
        let Some(brkpt) = self.breakpoints.get_enabled(pc) else {
            return Ok(());
        };
        brkpt.disable()?;
        let reason = self.debugee.single_step()?;
        if !self.debugee.is_exited() {
            if let Some(brkpt) = self.breakpoints.get(pc) {
                brkpt.enable()?;
            }
        }
        self.check_for_exit(reason)
    }

    fn check_for_exit(&self, reason: StopReason) -> Result<(), Error> {
        if let StopReason::DebugeeExit(code) = reason {
            return Err(Error::ProcessExit(code));
        }
        Ok(())
    }

    /// Step into: execute instructions until the tracee reaches a statement
    /// of a different source line. The prologue of a newly entered function
    /// is skipped, so a step into a call lands at the first body statement.
    pub(super) fn step_in(&mut self) -> Result<(), Error> {
        let start = {
            let location = self.debugee.location()?;
            self.debugee
                .debug_info
                .find_place_from_pc(location.global_pc)
                .map(|place| (place.file.to_path_buf(), place.line_number))
        };

        loop {
            self.single_step_instruction()
                .map_err(Self::exit_to_no_line)?;
            let location = self.debugee.location()?;
            let debug_info = &self.debugee.debug_info;

            let Some(place) = debug_info.find_place_from_pc(location.global_pc) else {
                continue;
            };
            if !place.is_stmt {
                continue;
            }
            let same_line = start
                .as_ref()
                .map(|(file, line)| place.file == file && place.line_number == *line)
                .unwrap_or(false);
            if same_line {
                continue;
            }

            // when a call was just entered, walk out of the prologue first:
            // the stop lands on the first body statement
            if let Some(func) = debug_info.find_function_by_pc(location.global_pc) {
                let prolog = func.prolog()?;
                while self.debugee.location()?.global_pc.in_range(&prolog) {
                    self.single_step_instruction()
                        .map_err(Self::exit_to_no_line)?;
                }
            }

            return Ok(());
        }
    }

    fn exit_to_no_line(e: Error) -> Error {
        match e {
            Error::ProcessExit(_) => Error::NoPlaceToStepTo,
            e => e,
        }
    }

    /// Step over: run until the next statement of a different line in the
    /// current function, without stopping inside called functions.
    ///
    /// Temporary breakpoints are installed at every other statement of the
    /// function and at the frame return address (to catch a return from the
    /// current line); all of them are removed before the command returns.
    pub(super) fn step_over_any(&mut self) -> Result<(), Error> {
        let location = self.debugee.location()?;
        let debug_info = &self.debugee.debug_info;

        let func = debug_info
            .find_function_by_pc(location.global_pc)
            .ok_or(Error::FunctionNotFoundAt(location.global_pc))?;
        let current_place = debug_info
            .find_place_from_pc(location.global_pc)
            .ok_or(Error::PlaceNotFound(location.global_pc))?;
        let current_line = current_place.line_number;
        let current_file = current_place.file.to_path_buf();

        let prolog = func.prolog()?;
        let ranges: Vec<Range> = func.ranges().to_vec();
        let unit = func.unit;

        let mut target_addresses = vec![];
        for range in &ranges {
            let Some(mut place) = unit.find_place_by_pc(range.begin.into()) else {
                continue;
            };
            while place.address.in_range(range) {
                let is_current_line =
                    place.line_number == current_line && place.file == current_file;
                if place.is_stmt && !is_current_line && !place.address.in_range(&prolog) {
                    target_addresses.push(place.address);
                }
                match place.next() {
                    None => break,
                    Some(next) => place = next,
                }
            }
        }

        let mapping_offset = self.debugee.mapping_offset();
        let pid = self.debugee.pid();
        let mut temporary = vec![];
        for address in target_addresses {
            let load_addr = address.relocate(mapping_offset);
            if self.breakpoints.enabled_at(load_addr) {
                continue;
            }
            self.breakpoints
                .add_and_enable(Breakpoint::new_temporary(load_addr, pid))?;
            temporary.push(load_addr);
        }

        // catch a return from the current function too, the next statement
        // may execute in the caller
        if let Ok(ret_addr) = self.return_addr() {
            if !self.breakpoints.enabled_at(ret_addr) {
                self.breakpoints
                    .add_and_enable(Breakpoint::new_temporary(ret_addr, pid))?;
                temporary.push(ret_addr);
            }
        }

        let resume_result = self.resume_to_next_stop();

        // temporary breakpoints never outlive the step, on any path
        for addr in temporary {
            self.breakpoints.remove(addr)?;
        }
        let stop = resume_result?;

        if let StopReason::DebugeeExit(code) = stop {
            return Err(Error::ProcessExit(code));
        }

        // a stop in the middle of a source line (right after the call
        // returned) finishes with a step to the next full statement
        let new_location = self.debugee.location()?;
        if let Some(place) = self
            .debugee
            .debug_info
            .find_place_from_pc(new_location.global_pc)
        {
            if place.address != new_location.global_pc {
                self.step_in()?;
            }
        }

        Ok(())
    }

    /// Step out: run until the current function returns.
    ///
    /// A temporary breakpoint is set at the frame return address; when no
    /// frame pointer is available the fallback is a breakpoint on the first
    /// statement past the function range.
    pub(super) fn step_out_frame(&mut self) -> Result<(), Error> {
        let ret_addr = match self.return_addr() {
            Ok(addr) => Some(addr),
            Err(Error::NoReturnAddress) => None,
            Err(e) => return Err(e),
        };

        let target = match ret_addr {
            Some(addr) => addr,
            None => {
                // no frame pointer: stop right past the function range
                let location = self.debugee.location()?;
                let debug_info = &self.debugee.debug_info;
                let func = debug_info
                    .find_function_by_pc(location.global_pc)
                    .ok_or(Error::FunctionNotFoundAt(location.global_pc))?;
                let high_pc = func
                    .high_pc()
                    .ok_or(Error::NoDebugInformation("function ranges"))?;
                let place = func
                    .unit
                    .find_place_by_pc(high_pc.into())
                    .ok_or(Error::PlaceNotFound(high_pc.into()))?;
                place.address.relocate(self.debugee.mapping_offset())
            }
        };

        if self.breakpoints.enabled_at(target) {
            let stop = self.resume_to_next_stop()?;
            if let StopReason::DebugeeExit(code) = stop {
                return Err(Error::ProcessExit(code));
            }
            return Ok(());
        }

        self.breakpoints
            .add_and_enable(Breakpoint::new_temporary(target, self.debugee.pid()))?;
        let resume_result = self.resume_to_next_stop();
        self.breakpoints.remove(target)?;
        let stop = resume_result?;

        if let StopReason::DebugeeExit(code) = stop {
            return Err(Error::ProcessExit(code));
        }
        Ok(())
    }

    /// Resume the tracee (stepping over a hosted breakpoint first) and wait
    /// for the next stop.
    pub(super) fn resume_to_next_stop(&mut self) -> Result<StopReason, Error> {
        match self.step_over_breakpoint() {
            Err(Error::ProcessExit(code)) => return Ok(StopReason::DebugeeExit(code)),
            other => other?,
        }
        self.debugee.resume()
    }
}
