//! JpegTransform — compresses a semi-planar frame into a blob buffer.
//!
//! One encoder session is opened per unit in `prepare` and reused for every
//! frame. Encoder failures surface as [`PipelineError::Encode`].

use super::ensure_distinct;
use crate::backend::{JpegEngine, JpegSession};
use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::settings::ProcessingSettings;
use crate::pipeline::transform::TransformOutcome;
use crate::types::{FrameDescriptor, PixelFormat};
use std::sync::Arc;

pub struct JpegTransform {
    engine: Arc<dyn JpegEngine>,
    session: Option<Box<dyn JpegSession>>,
}

impl JpegTransform {
    pub fn new(engine: Arc<dyn JpegEngine>) -> Self {
        Self {
            engine,
            session: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn check_format(input: &FrameDescriptor, output: &FrameDescriptor) -> bool {
        input.format.is_semi_planar() && output.format == PixelFormat::Blob
    }

    pub fn prepare(&mut self) -> PipelineResult<()> {
        self.session()?;
        Ok(())
    }

    fn session(&mut self) -> PipelineResult<&mut Box<dyn JpegSession>> {
        match &mut self.session {
            Some(session) => Ok(session),
            slot => {
                let session = self
                    .engine
                    .create_session()
                    .map_err(|e| PipelineError::Encode(e.to_string()))?;
                Ok(slot.insert(session))
            }
        }
    }

    pub fn process(
        &mut self,
        input: &ProcBuffer,
        output: &ProcBuffer,
        settings: &ProcessingSettings,
    ) -> PipelineResult<TransformOutcome> {
        let (in_desc, out_desc) = (*input.descriptor(), *output.descriptor());
        if !in_desc.format.is_semi_planar() {
            return Err(PipelineError::UnsupportedFormat(in_desc.format));
        }
        if out_desc.format != PixelFormat::Blob {
            return Err(PipelineError::UnsupportedFormat(out_desc.format));
        }
        ensure_distinct(input, output)?;

        let written = self
            .session()?
            .encode(input.frame(), output.frame(), settings)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        tracing::trace!("Encoded {} into {} bytes", input.id(), written);
        Ok(TransformOutcome::Produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::encoder::{MockJpegEngine, MockJpegSession};
    use crate::backend::EncoderError;
    use crate::pipeline::buffer::FrameBuffer;

    fn buffer(desc: FrameDescriptor) -> ProcBuffer {
        ProcBuffer::wrap(Arc::new(FrameBuffer::new(desc)))
    }

    #[test]
    fn test_prepare_opens_single_session() {
        let mut engine = MockJpegEngine::new();
        engine.expect_create_session().times(1).returning(|| {
            let mut session = MockJpegSession::new();
            session.expect_encode().times(2).returning(|_, _, _| Ok(10));
            Ok(Box::new(session) as Box<dyn JpegSession>)
        });
        let mut jpeg = JpegTransform::new(Arc::new(engine));
        jpeg.prepare().unwrap();
        assert!(jpeg.has_session());

        let input = buffer(FrameDescriptor::nv12(16, 16));
        let output = buffer(FrameDescriptor::blob(16, 16));
        let settings = ProcessingSettings::default();
        jpeg.process(&input, &output, &settings).unwrap();
        jpeg.process(&input, &output, &settings).unwrap();
    }

    #[test]
    fn test_session_failure_is_encode_error() {
        let mut engine = MockJpegEngine::new();
        engine
            .expect_create_session()
            .returning(|| Err(EncoderError::Session("no hardware".into())));
        let mut jpeg = JpegTransform::new(Arc::new(engine));
        assert!(matches!(jpeg.prepare().unwrap_err(), PipelineError::Encode(_)));
    }

    #[test]
    fn test_encode_failure_is_encode_error() {
        let mut engine = MockJpegEngine::new();
        engine.expect_create_session().returning(|| {
            let mut session = MockJpegSession::new();
            session
                .expect_encode()
                .returning(|_, _, _| Err(EncoderError::Encode("bad huffman table".into())));
            Ok(Box::new(session) as Box<dyn JpegSession>)
        });
        let mut jpeg = JpegTransform::new(Arc::new(engine));
        let err = jpeg
            .process(
                &buffer(FrameDescriptor::nv12(16, 16)),
                &buffer(FrameDescriptor::blob(16, 16)),
                &ProcessingSettings::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Encode(_)));
    }

    #[test]
    fn test_output_must_be_blob() {
        let mut jpeg = JpegTransform::new(Arc::new(MockJpegEngine::new()));
        let err = jpeg
            .process(
                &buffer(FrameDescriptor::nv12(16, 16)),
                &buffer(FrameDescriptor::nv12(16, 16)),
                &ProcessingSettings::default(),
            )
            .unwrap_err();
        assert_eq!(err, PipelineError::UnsupportedFormat(PixelFormat::Nv12));
    }

    #[test]
    fn test_software_engine_end_to_end() {
        let mut jpeg = JpegTransform::new(Arc::new(crate::backend::SoftwareJpegEngine::default()));
        jpeg.prepare().unwrap();
        let input = ProcBuffer::wrap(Arc::new(FrameBuffer::from_bytes(
            FrameDescriptor::nv12(32, 32),
            vec![128; 32 * 32 * 3 / 2],
        )));
        let output = buffer(FrameDescriptor::blob(32, 32));
        jpeg.process(&input, &output, &ProcessingSettings::default())
            .unwrap();
        let used = output.frame().bytes_used();
        assert!(used > 0);
        assert_eq!(&output.frame().to_vec()[..2], &[0xFF, 0xD8]);
    }
}
