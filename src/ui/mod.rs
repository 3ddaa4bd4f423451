/// Canvas programs of the frame window
pub mod canvas;
pub mod histogram;
