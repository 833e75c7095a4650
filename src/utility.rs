/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use num::traits::PrimInt;

/* -------------------------------------------------------------------------- */

// Helper function for integer division rounding up
pub fn div_int_up<T: PrimInt>(a: T, b: T) -> T {
    (a + b - T::one()) / b
}

// Helper function for integer division rounding down
pub fn div_int_down<T: PrimInt>(n: T, d: T) -> T {
    n / d
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_up_and_down() {
        assert_eq!(div_int_up(10, 3), 4);
        assert_eq!(div_int_down(10, 3), 3);
        assert_eq!(div_int_up(9, 3), 3);
    }
}
